//! Typed scalar values.
//!
//! An [`ItemData`] never changes after construction. Values are shared
//! between groups and tables through [`ItemDataPtr`]; "updating" a value
//! means pointing the owner at a different item.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::error::{Result, StorageError};

/// Identifies the cataloged quantity an item carries (usually a column).
pub type ItemId = u64;

/// Id of items that do not stand for a cataloged quantity.
pub const ITEM_ID_ANONY: ItemId = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Bool,
    Int,
    Uint64,
    Double,
    String,
}

impl ItemType {
    pub fn name(self) -> &'static str {
        match self {
            ItemType::Bool => "bool",
            ItemType::Int => "int",
            ItemType::Uint64 => "uint64",
            ItemType::Double => "double",
            ItemType::String => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ItemType::Int | ItemType::Uint64 | ItemType::Double)
    }
}

impl Display for ItemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Bool(bool),
    Int(i32),
    Uint64(u64),
    Double(f64),
    String(String),
}

impl ItemValue {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemValue::Bool(_) => ItemType::Bool,
            ItemValue::Int(_) => ItemType::Int,
            ItemValue::Uint64(_) => ItemType::Uint64,
            ItemValue::Double(_) => ItemType::Double,
            ItemValue::String(_) => ItemType::String,
        }
    }

    fn zero(item_type: ItemType) -> Self {
        match item_type {
            ItemType::Bool => ItemValue::Bool(false),
            ItemType::Int => ItemValue::Int(0),
            ItemType::Uint64 => ItemValue::Uint64(0),
            ItemType::Double => ItemValue::Double(0.0),
            ItemType::String => ItemValue::String(String::new()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ItemValue::Int(v) => Some(f64::from(*v)),
            ItemValue::Uint64(v) => Some(*v as f64),
            ItemValue::Double(v) => Some(*v),
            ItemValue::Bool(_) | ItemValue::String(_) => None,
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            ItemValue::Int(v) => Some(i128::from(*v)),
            ItemValue::Uint64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }
}

impl Display for ItemValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ItemValue::Bool(v) => write!(f, "{v}"),
            ItemValue::Int(v) => write!(f, "{v}"),
            ItemValue::Uint64(v) => write!(f, "{v}"),
            ItemValue::Double(v) => write!(f, "{v}"),
            ItemValue::String(v) => f.write_str(v),
        }
    }
}

/// Hashable form of an item, normalized so that two items produce the same
/// key exactly when [`ItemData::equals`] holds (NULL keys match each other).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Null,
    Bool(bool),
    Integer(i128),
    Double(u64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemData {
    id: ItemId,
    value: ItemValue,
    null: bool,
}

pub type ItemDataPtr = Arc<ItemData>;

impl ItemData {
    pub fn new(id: ItemId, value: ItemValue) -> ItemDataPtr {
        Arc::new(Self {
            id,
            value,
            null: false,
        })
    }

    /// A NULL of the given type. The payload is the type's zero value.
    pub fn null(id: ItemId, item_type: ItemType) -> ItemDataPtr {
        Arc::new(Self {
            id,
            value: ItemValue::zero(item_type),
            null: true,
        })
    }

    pub fn bool(id: ItemId, value: bool) -> ItemDataPtr {
        Self::new(id, ItemValue::Bool(value))
    }

    pub fn int(id: ItemId, value: i32) -> ItemDataPtr {
        Self::new(id, ItemValue::Int(value))
    }

    pub fn uint64(id: ItemId, value: u64) -> ItemDataPtr {
        Self::new(id, ItemValue::Uint64(value))
    }

    pub fn double(id: ItemId, value: f64) -> ItemDataPtr {
        Self::new(id, ItemValue::Double(value))
    }

    pub fn string(id: ItemId, value: impl Into<String>) -> ItemDataPtr {
        Self::new(id, ItemValue::String(value.into()))
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn item_type(&self) -> ItemType {
        self.value.item_type()
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    /// Numeric payload as `f64`; `None` for NULL and non-numeric items.
    pub fn as_f64(&self) -> Option<f64> {
        if self.null {
            return None;
        }
        self.value.as_f64()
    }

    /// Integral payload of Int and Uint64 items.
    pub fn as_integer(&self) -> Option<i128> {
        if self.null {
            return None;
        }
        self.value.as_i128()
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ItemValue::String(s) if !self.null => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            ItemValue::Bool(b) if !self.null => Some(b),
            _ => None,
        }
    }

    /// Orders two items.
    ///
    /// Numeric kinds compare numerically with each other, strings
    /// lexicographically and booleans with booleans. `Ok(None)` means the
    /// order is unknown (a NULL operand or a NaN). Any other pairing is a
    /// [`StorageError::TypeMismatch`].
    pub fn compare(&self, other: &ItemData) -> Result<Option<Ordering>> {
        let left = self.item_type();
        let right = other.item_type();
        let comparable = (left.is_numeric() && right.is_numeric()) || left == right;
        if !comparable {
            return Err(StorageError::TypeMismatch { left, right });
        }
        if self.null || other.null {
            return Ok(None);
        }
        let ordering = match (&self.value, &other.value) {
            (ItemValue::Bool(a), ItemValue::Bool(b)) => Some(a.cmp(b)),
            (ItemValue::String(a), ItemValue::String(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)),
            },
        };
        Ok(ordering)
    }

    /// SQL equality. NULL equals nothing and incomparable kinds are unequal.
    pub fn equals(&self, other: &ItemData) -> bool {
        matches!(self.compare(other), Ok(Some(Ordering::Equal)))
    }

    pub fn key(&self) -> ItemKey {
        if self.null {
            return ItemKey::Null;
        }
        match &self.value {
            ItemValue::Bool(b) => ItemKey::Bool(*b),
            ItemValue::Int(v) => ItemKey::Integer(i128::from(*v)),
            ItemValue::Uint64(v) => ItemKey::Integer(i128::from(*v)),
            ItemValue::Double(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e38 {
                    ItemKey::Integer(*v as i128)
                } else {
                    ItemKey::Double(v.to_bits())
                }
            }
            ItemValue::String(s) => ItemKey::String(s.clone()),
        }
    }

    /// Converts `item` into `target`, keeping its id and NULL-ness.
    pub fn coerce(item: &ItemDataPtr, target: ItemType) -> Result<ItemDataPtr> {
        if item.item_type() == target {
            return Ok(Arc::clone(item));
        }
        if item.null {
            return Ok(ItemData::null(item.id, target));
        }
        let fail = || StorageError::Coercion {
            value: item.value.to_string(),
            target,
        };
        let value = match (target, &item.value) {
            (ItemType::String, v) => ItemValue::String(v.to_string()),
            (ItemType::Double, ItemValue::String(s)) => {
                ItemValue::Double(s.trim().parse().map_err(|_| fail())?)
            }
            (ItemType::Double, v) => ItemValue::Double(v.as_f64().ok_or_else(fail)?),
            (ItemType::Int, ItemValue::String(s)) => {
                ItemValue::Int(s.trim().parse().map_err(|_| fail())?)
            }
            (ItemType::Int, ItemValue::Double(d)) if d.fract() == 0.0 => {
                ItemValue::Int(i32::try_from(*d as i64).map_err(|_| fail())?)
            }
            (ItemType::Int, v) => {
                let wide = v.as_i128().ok_or_else(fail)?;
                ItemValue::Int(i32::try_from(wide).map_err(|_| fail())?)
            }
            (ItemType::Uint64, ItemValue::String(s)) => {
                ItemValue::Uint64(s.trim().parse().map_err(|_| fail())?)
            }
            (ItemType::Uint64, ItemValue::Double(d)) if d.fract() == 0.0 && *d >= 0.0 => {
                ItemValue::Uint64(*d as u64)
            }
            (ItemType::Uint64, v) => {
                let wide = v.as_i128().ok_or_else(fail)?;
                ItemValue::Uint64(u64::try_from(wide).map_err(|_| fail())?)
            }
            (ItemType::Bool, ItemValue::String(s)) => match s.trim() {
                "true" | "1" => ItemValue::Bool(true),
                "false" | "0" => ItemValue::Bool(false),
                _ => return Err(fail()),
            },
            (ItemType::Bool, v) => match v.as_i128() {
                Some(0) => ItemValue::Bool(false),
                Some(1) => ItemValue::Bool(true),
                _ => return Err(fail()),
            },
        };
        Ok(ItemData::new(item.id, value))
    }
}

impl Display for ItemData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.null {
            f.write_str("NULL")
        } else {
            self.value.fmt(f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_kinds_compare_across_types() {
        let a = ItemData::int(ITEM_ID_ANONY, 5);
        let b = ItemData::uint64(ITEM_ID_ANONY, 5);
        let c = ItemData::double(ITEM_ID_ANONY, 5.5);
        assert!(a.equals(&b));
        assert_eq!(a.compare(&c).unwrap(), Some(Ordering::Less));
        assert_eq!(c.compare(&b).unwrap(), Some(Ordering::Greater));
    }

    #[test]
    fn mixed_kinds_are_unequal_and_unordered() {
        let num = ItemData::int(1, 1);
        let text = ItemData::string(2, "1");
        assert!(!num.equals(&text));
        assert_eq!(
            num.compare(&text),
            Err(StorageError::TypeMismatch {
                left: ItemType::Int,
                right: ItemType::String,
            })
        );
    }

    #[test]
    fn null_never_equals() {
        let null = ItemData::null(1, ItemType::Int);
        let zero = ItemData::int(1, 0);
        assert!(null.is_null());
        assert!(!null.equals(&zero));
        assert!(!null.equals(&ItemData::null(1, ItemType::Int)));
        assert_eq!(null.compare(&zero).unwrap(), None);
        assert_eq!(null.to_string(), "NULL");
    }

    #[test]
    fn canonical_text() {
        assert_eq!(ItemData::int(1, -7).to_string(), "-7");
        assert_eq!(ItemData::uint64(1, u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(ItemData::double(1, 2.5).to_string(), "2.5");
        assert_eq!(ItemData::bool(1, true).to_string(), "true");
        assert_eq!(ItemData::string(1, "abc").to_string(), "abc");
    }

    #[test]
    fn keys_follow_sql_equality() {
        assert_eq!(ItemData::int(1, 3).key(), ItemData::uint64(2, 3).key());
        assert_eq!(ItemData::double(1, 3.0).key(), ItemData::int(2, 3).key());
        assert_ne!(ItemData::double(1, 3.5).key(), ItemData::int(2, 3).key());
        assert_eq!(ItemData::null(1, ItemType::Int).key(), ItemKey::Null);
    }

    #[test]
    fn coerce_literals_to_column_types() {
        let five = ItemData::int(ITEM_ID_ANONY, 5);
        let as_text = ItemData::coerce(&five, ItemType::String).unwrap();
        assert_eq!(as_text.as_str(), Some("5"));

        let text = ItemData::string(ITEM_ID_ANONY, "42");
        let as_u64 = ItemData::coerce(&text, ItemType::Uint64).unwrap();
        assert_eq!(as_u64.value(), &ItemValue::Uint64(42));

        let negative = ItemData::int(ITEM_ID_ANONY, -1);
        assert!(ItemData::coerce(&negative, ItemType::Uint64).is_err());
    }
}
