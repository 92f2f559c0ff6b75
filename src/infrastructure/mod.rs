// Infrastructure layer - External dependencies and adapters
pub mod chunked_body;
pub mod config;
pub mod csv_export;
pub mod http_response;
pub mod sqlite_repository;
