pub mod cli;
pub mod enrichment;
pub mod error;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod output;
pub mod state;
