//! Observable request state and partial updates

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ReqstateError;

/// Transfer progress in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: u64,
    pub loaded: u64,
}

impl Progress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { total, loaded }
    }
}

/// State of one request key as seen by observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    pub loading: bool,
    pub data: Value,
    pub error: Option<ReqstateError>,
    pub downloading: Progress,
    pub uploading: Progress,
}

impl RequestState {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }
}

/// Partial update handed to [`StatesHook::update`](crate::hooks::StatesHook::update).
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub loading: Option<bool>,
    pub data: Option<Value>,
    pub error: Option<Option<ReqstateError>>,
    pub downloading: Option<Progress>,
    pub uploading: Option<Progress>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = Some(loading);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error(mut self, error: ReqstateError) -> Self {
        self.error = Some(Some(error));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn downloading(mut self, progress: Progress) -> Self {
        self.downloading = Some(progress);
        self
    }

    pub fn uploading(mut self, progress: Progress) -> Self {
        self.uploading = Some(progress);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(self, state: &mut RequestState) {
        if let Some(loading) = self.loading {
            state.loading = loading;
        }
        if let Some(data) = self.data {
            state.data = data;
        }
        if let Some(error) = self.error {
            state.error = error;
        }
        if let Some(progress) = self.downloading {
            state.downloading = progress;
        }
        if let Some(progress) = self.uploading {
            state.uploading = progress;
        }
    }
}
