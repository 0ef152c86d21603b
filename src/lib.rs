pub mod app;
pub mod config;
pub mod error;
pub mod state;
pub mod models {
    pub mod document;
    pub mod search;
}
pub mod db {
    pub mod memory;
    pub mod repository;
    pub mod schema;
    pub mod scylla;
}
pub mod search {
    pub mod client;
    pub mod elasticsearch;
    pub mod memory;
    pub mod query;
    pub mod service;
}
pub mod sync {
    pub mod scheduler;
    pub mod service;
}
pub mod api {
    pub mod documents;
    pub mod errors;
    pub mod indexing;
    pub mod search;
}
