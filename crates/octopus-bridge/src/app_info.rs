//! Application descriptor handed to the engine

use serde::{Deserialize, Serialize};

/// Information about the host application
///
/// Exposed to scripts as the constant `app_info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    /// Unique identifier of the embedding (extension id, bundle id, ...)
    pub id: String,
    /// Version of the embedding
    pub version: String,
    /// Product name
    pub name: String,
    /// Host application name
    pub application: String,
    /// Host application version
    pub application_version: String,
    /// UI locale, e.g. `en-US`
    pub locale: String,
    /// Whether this is a development build
    pub developer_build: bool,
}

impl AppInfo {
    /// Create an app descriptor with a name and version
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Set the host application name and version
    pub fn with_application<N: Into<String>, V: Into<String>>(mut self, name: N, version: V) -> Self {
        self.application = name.into();
        self.application_version = version.into();
        self
    }

    /// Set the locale
    pub fn with_locale<S: Into<String>>(mut self, locale: S) -> Self {
        self.locale = locale.into();
        self
    }

    /// Mark as a development build
    pub fn developer_build(mut self) -> Self {
        self.developer_build = true;
        self
    }
}
