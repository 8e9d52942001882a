use thiserror::Error;

/// Errors raised by the viewer. Only the wasm boundary converts these into `JsValue`.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("mount point #{0} not found in document")]
    MissingMountPoint(String),

    #[error("javascript error: {0}")]
    Js(String),

    #[error("gpu initialisation failed: {0}")]
    Gpu(String),

    #[error("failed to fetch {path}: {reason}")]
    AssetFetch { path: String, reason: String },

    #[error("invalid glTF asset: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("model contains no triangle geometry")]
    EmptyModel,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("scene node {0} does not exist")]
    UnknownNode(usize),

    #[error("cannot attach node {node} below its own descendant {parent}")]
    CyclicAttach { node: usize, parent: usize },

    #[error("a model has already been installed into the scene")]
    ModelAlreadyLoaded,

    #[error("controller slot {0} is out of range")]
    InvalidSlot(usize),
}

impl From<wasm_bindgen::JsValue> for ViewerError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        ViewerError::Js(format!("{value:?}"))
    }
}

impl From<ViewerError> for wasm_bindgen::JsValue {
    fn from(err: ViewerError) -> Self {
        wasm_bindgen::JsValue::from_str(&err.to_string())
    }
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
