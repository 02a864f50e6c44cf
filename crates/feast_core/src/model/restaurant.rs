//! Restaurant record and layer identity types.
//!
//! # Responsibility
//! - Define the canonical restaurant shape shared by parser, layers and disk.
//! - Provide the minimal validation used by the persistence boundary.
//!
//! # Invariants
//! - `name` and `identifier` must be non-empty for a record to persist.
//! - `ObjectId` values are unique per manager; `identifier` values are not.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Row identity assigned when a record is inserted into a layer.
///
/// Distinct from the remote `identifier`: repeated fetches of the same
/// remote restaurant produce distinct object ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

/// Attribute names of [`Restaurant`], in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestaurantAttribute {
    Identifier,
    Index,
    Location,
    Name,
}

impl RestaurantAttribute {
    pub const ALL: [RestaurantAttribute; 4] = [
        Self::Identifier,
        Self::Index,
        Self::Location,
        Self::Name,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Index => "index",
            Self::Location => "location",
            Self::Name => "name",
        }
    }
}

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Restaurant entity as delivered by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Remote key (`_id` in the API payload).
    pub identifier: String,
    /// Display ordinal.
    pub index: i16,
    pub location: Option<Location>,
    pub name: String,
}

/// Validation errors for restaurant records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestaurantValidationError {
    EmptyIdentifier,
    EmptyName { identifier: String },
}

impl Display for RestaurantValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyIdentifier => write!(f, "restaurant identifier must not be empty"),
            Self::EmptyName { identifier } => {
                write!(f, "restaurant `{identifier}` must have a non-empty name")
            }
        }
    }
}

impl Error for RestaurantValidationError {}

impl Restaurant {
    /// Creates a record with default ordinal and no location.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            index: 0,
            location: None,
            name: name.into(),
        }
    }

    /// Checks the invariants required before a record is written to disk.
    pub fn validate(&self) -> Result<(), RestaurantValidationError> {
        if self.identifier.trim().is_empty() {
            return Err(RestaurantValidationError::EmptyIdentifier);
        }
        if self.name.trim().is_empty() {
            return Err(RestaurantValidationError::EmptyName {
                identifier: self.identifier.clone(),
            });
        }
        Ok(())
    }
}

/// A restaurant together with the row identity it holds inside a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRestaurant {
    pub object_id: ObjectId,
    #[serde(flatten)]
    pub restaurant: Restaurant,
}

impl StoredRestaurant {
    pub fn new(object_id: ObjectId, restaurant: Restaurant) -> Self {
        Self {
            object_id,
            restaurant,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.restaurant.identifier
    }

    pub fn name(&self) -> &str {
        &self.restaurant.name
    }
}

/// Display ordering: by `index`, then by insertion identity.
pub fn sort_for_display(rows: &mut [StoredRestaurant]) {
    rows.sort_by(|left, right| {
        left.restaurant
            .index
            .cmp(&right.restaurant.index)
            .then(left.object_id.cmp(&right.object_id))
    });
}

#[cfg(test)]
mod tests {
    use super::{
        sort_for_display, ObjectId, Restaurant, RestaurantAttribute, RestaurantValidationError,
        StoredRestaurant,
    };

    #[test]
    fn attribute_names_match_serialized_fields() {
        let value = serde_json::to_value(Restaurant::new("r1", "Cafe A")).unwrap();
        let fields = value.as_object().unwrap();
        for attribute in RestaurantAttribute::ALL {
            assert!(fields.contains_key(attribute.as_str()), "{attribute:?}");
        }
        assert_eq!(fields.len(), RestaurantAttribute::ALL.len());
    }

    #[test]
    fn validate_rejects_blank_name() {
        let restaurant = Restaurant::new("r1", "   ");
        assert_eq!(
            restaurant.validate().unwrap_err(),
            RestaurantValidationError::EmptyName {
                identifier: "r1".to_string()
            }
        );
    }

    #[test]
    fn display_order_uses_index_then_object_id() {
        let mut late = Restaurant::new("a", "A");
        late.index = 2;
        let mut rows = vec![
            StoredRestaurant::new(ObjectId(1), late),
            StoredRestaurant::new(ObjectId(3), Restaurant::new("b", "B")),
            StoredRestaurant::new(ObjectId(2), Restaurant::new("c", "C")),
        ];
        sort_for_display(&mut rows);
        let ids: Vec<u64> = rows.iter().map(|row| row.object_id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
