#[derive(Debug, thiserror::Error)]
pub enum FlowmonError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("cannot sort by {0}: field is not part of the aggregate")]
    NotAggregated(String),
    #[error("aggregate has no members")]
    EmptyAggregate,
    #[error("invalid record at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("observation domain {0} not supported")]
    UnsupportedDomain(u32),
    #[error("enrichment lookup failed: {0}")]
    Enrichment(String),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[source] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}
