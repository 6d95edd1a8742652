// Application layer - Use cases and collaborator traits
pub mod poller;
pub mod tracker_service;
pub mod transit_repository;
