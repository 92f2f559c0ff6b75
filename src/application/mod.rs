// Application layer - Use cases over the domain and repository ports
pub mod digitisation_service;
pub mod plot_repository;
pub mod plot_service;
