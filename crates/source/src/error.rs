//! Typed failures an adapter can raise on a single collection cycle (§4.6).

#[derive(Debug, thiserror::Error)]
pub enum VirtError {
    #[error("network error talking to hypervisor: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response from hypervisor: {0}")]
    MalformedResponse(String),

    #[error("could not read fixture {path}: {source}")]
    Fixture {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse fixture {path}: {source}")]
    FixtureJson {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
