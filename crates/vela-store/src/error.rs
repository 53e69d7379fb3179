use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown cache layer: {0}")]
    UnknownLayer(usize),

    #[error("Cache layer {0} still has live children")]
    LayerHasChildren(usize),

    #[error("Root layer cannot be flushed or discarded")]
    RootLayer,

    #[error("Version {0} is not retained")]
    VersionNotRetained(u64),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Corrupt state file: {0}")]
    Corrupt(String),
}
