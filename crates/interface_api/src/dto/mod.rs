//! Request and response types

pub mod claims;
pub mod patient_history;

use serde::Serialize;

/// `{"data": ...}` envelope
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// `{"data": [...], "count": n}` envelope
#[derive(Debug, Serialize)]
pub struct CountedResponse<T> {
    pub data: Vec<T>,
    pub count: usize,
}

impl<T> CountedResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        let count = data.len();
        Self { data, count }
    }
}
