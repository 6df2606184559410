use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

/// A generic notification request as accepted from callers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushNotification {
    /// Ordered device tokens. When empty, `to` names the single recipient.
    pub tokens: Vec<String>,
    /// Legacy single-recipient field.
    pub to: String,
    pub title: String,
    pub message: String,
    pub image: String,
    pub data: HashMap<String, DataValue>,
    pub notification: Option<Notification>,
    pub collapse_key: String,
    pub priority: String,
    /// Retention of an undelivered notification, in seconds.
    pub time_to_live: Option<u32>,
    pub sound: Option<DataValue>,
}

impl PushNotification {
    /// Recipients the request addresses, in submission order.
    pub fn recipients(&self) -> Vec<String> {
        if self.tokens.is_empty() && !self.to.is_empty() {
            vec![self.to.clone()]
        } else {
            self.tokens.clone()
        }
    }
}

/// Nested notification block. Its fields override the top-level ones for the
/// platform notification only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub image: String,
    pub sound: String,
    pub channel_id: String,
    pub tag: String,
    pub color: String,
    pub click_action: String,
    pub body_loc_key: String,
    pub body_loc_args: Vec<String>,
    pub title_loc_key: String,
    pub title_loc_args: Vec<String>,
    pub badge: Option<DataValue>,
}

impl Notification {
    /// Derive the platform notification count from the badge source.
    ///
    /// Accepts integers, integral floats and numeric strings in `0..=i32::MAX`.
    pub fn notification_count(&self) -> Result<Option<i32>, DataValue> {
        let Some(badge) = &self.badge else {
            return Ok(None);
        };
        let count = match badge {
            DataValue::Null => return Ok(None),
            DataValue::Int(value) => i32::try_from(*value).ok(),
            DataValue::Uint(value) => i32::try_from(*value).ok(),
            DataValue::F32(value) => integral_float(f64::from(*value)),
            DataValue::F64(value) => integral_float(*value),
            DataValue::String(value) => value.trim().parse::<i32>().ok(),
            DataValue::Bool(_) | DataValue::Nested(_) => None,
        };
        match count {
            Some(count) if count >= 0 => Ok(Some(count)),
            _ => Err(badge.clone()),
        }
    }
}

fn integral_float(value: f64) -> Option<i32> {
    if value.is_finite() && value.fract() == 0.0 && value <= f64::from(i32::MAX) {
        Some(value as i32)
    } else {
        None
    }
}

/// A dynamically-typed data value.
///
/// Scalars convert to strings for the platform data map. `Nested` holds
/// arrays and objects, which the platform cannot carry.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    F32(f32),
    F64(f64),
    String(String),
    Nested(serde_json::Value),
}

impl DataValue {
    pub fn kind(&self) -> &'static str {
        match self {
            DataValue::Null => "null",
            DataValue::Bool(_) => "bool",
            DataValue::Int(_) => "int",
            DataValue::Uint(_) => "uint",
            DataValue::F32(_) => "f32",
            DataValue::F64(_) => "f64",
            DataValue::String(_) => "string",
            DataValue::Nested(serde_json::Value::Array(_)) => "array",
            DataValue::Nested(_) => "object",
        }
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Bool(value) => DataValue::Bool(value),
            serde_json::Value::String(value) => DataValue::String(value),
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_u64() {
                    DataValue::Uint(value)
                } else if let Some(value) = number.as_i64() {
                    DataValue::Int(value)
                } else {
                    DataValue::F64(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            nested => DataValue::Nested(nested),
        }
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(DataValue::from)
    }
}

macro_rules! impl_from_scalar {
    ($variant:ident <= $($ty:ty),+) => {
        $(
            impl From<$ty> for DataValue {
                fn from(value: $ty) -> Self {
                    DataValue::$variant(value.into())
                }
            }
        )+
    };
}

impl_from_scalar!(Int <= i8, i16, i32, i64);
impl_from_scalar!(Uint <= u8, u16, u32, u64);
impl_from_scalar!(F32 <= f32);
impl_from_scalar!(F64 <= f64);
impl_from_scalar!(Bool <= bool);
impl_from_scalar!(String <= String, &str);

impl From<isize> for DataValue {
    fn from(value: isize) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<usize> for DataValue {
    fn from(value: usize) -> Self {
        DataValue::Uint(value as u64)
    }
}
