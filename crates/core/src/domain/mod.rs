pub mod won_service;
