use serde::{Deserialize, Serialize};

/// A business returned by the Places Resolver. Immutable once fetched —
/// nothing in the engine mutates a `Business` after it's attached to a
/// [`crate::domain::CallRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Business {
    pub id: String,
    pub name: String,
    /// E.164 formatted phone number. Only businesses with a phone number are
    /// admitted into a call set (§4.7).
    pub phone: String,
    pub address: Option<String>,
    pub rating: Option<f32>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}
