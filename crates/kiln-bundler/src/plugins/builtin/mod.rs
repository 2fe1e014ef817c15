//! Stages shipped with kiln.

mod component;
mod define;
mod framework;
mod jsx;

pub use component::ComponentStage;
pub(crate) use component::script_sources;
pub use define::DefineStage;
pub use framework::{FrameworkOptions, FrameworkStage};
pub use jsx::{JsxOptions, JsxStage};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::StageError;

/// Deserialize a stage's `config` value; `null` means defaults.
fn stage_options<T: DeserializeOwned + Default>(name: &str, config: &Value) -> Result<T, StageError> {
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone())
        .map_err(|err| StageError::new(format!("invalid `{name}` config: {err}")))
}
