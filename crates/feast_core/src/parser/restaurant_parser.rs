//! Restaurant parser bound to one layer.

use crate::model::restaurant::{Location, Restaurant, StoredRestaurant};
use crate::parser::{required_str, JsonObject, JsonParser, ParseError};
use crate::store::layer::{Layer, LayerError};
use log::error;
use serde_json::Value;

const ID_FIELD: &str = "_id";
const NAME_FIELD: &str = "name";
const INDEX_FIELD: &str = "index";
const LOCATION_FIELD: &str = "location";

/// Parses restaurant objects and inserts them into its layer.
#[derive(Debug, Clone)]
pub struct RestaurantParser {
    layer: Layer,
}

impl RestaurantParser {
    pub fn new(layer: Layer) -> Self {
        Self { layer }
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    /// Parses one object into a new record in the layer.
    ///
    /// # Panics
    /// Panics when `_id` or `name` is missing, blank, or not a string.
    pub async fn parse_one(&self, object: &JsonObject) -> Result<StoredRestaurant, LayerError> {
        let restaurant = match self.build_object(object) {
            Ok(restaurant) => restaurant,
            Err(err) => {
                error!(
                    "event=parse_restaurant module=parser status=fatal layer={} error={}",
                    self.layer.id(),
                    err
                );
                panic!("malformed restaurant payload: {err}");
            }
        };
        let object_id = self.layer.insert(restaurant.clone()).await?;
        Ok(StoredRestaurant::new(object_id, restaurant))
    }

    /// Parses objects one at a time, preserving input order.
    ///
    /// # Panics
    /// Panics on the first object that fails [`RestaurantParser::parse_one`].
    pub async fn parse_many(
        &self,
        objects: &[JsonObject],
    ) -> Result<Vec<StoredRestaurant>, LayerError> {
        let mut parsed = Vec::with_capacity(objects.len());
        for object in objects {
            parsed.push(self.parse_one(object).await?);
        }
        Ok(parsed)
    }

    pub fn serialize(&self, restaurant: &Restaurant) -> JsonObject {
        self.build_json_object(restaurant)
    }
}

impl JsonParser for RestaurantParser {
    type Object = Restaurant;

    fn build_object(&self, object: &JsonObject) -> Result<Restaurant, ParseError> {
        let identifier = required_str(object, ID_FIELD)?;
        let name = required_str(object, NAME_FIELD)?;

        Ok(Restaurant {
            identifier: identifier.to_string(),
            index: optional_index(object),
            location: optional_location(object),
            name: name.to_string(),
        })
    }
}

fn optional_index(object: &JsonObject) -> i16 {
    object
        .get(INDEX_FIELD)
        .and_then(Value::as_i64)
        .and_then(|value| i16::try_from(value).ok())
        .unwrap_or_default()
}

fn optional_location(object: &JsonObject) -> Option<Location> {
    let location = object.get(LOCATION_FIELD)?.as_object()?;
    Some(Location {
        latitude: location.get("latitude")?.as_f64()?,
        longitude: location.get("longitude")?.as_f64()?,
    })
}

#[cfg(test)]
mod tests {
    use super::{optional_index, optional_location};
    use crate::parser::{required_str, JsonObject, ParseError};
    use serde_json::json;

    fn object(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn required_str_reports_missing_and_wrong_type() {
        let payload = object(json!({ "_id": 7 }));
        assert_eq!(
            required_str(&payload, "_id").unwrap_err(),
            ParseError::WrongType {
                field: "_id",
                expected: "string"
            }
        );
        assert_eq!(
            required_str(&payload, "name").unwrap_err(),
            ParseError::MissingField("name")
        );
    }

    #[test]
    fn required_str_rejects_blank_values() {
        let payload = object(json!({ "_id": "r1", "name": "  ", "alias": "" }));
        assert_eq!(required_str(&payload, "_id").unwrap(), "r1");
        assert_eq!(
            required_str(&payload, "name").unwrap_err(),
            ParseError::BlankField("name")
        );
        assert_eq!(
            required_str(&payload, "alias").unwrap_err(),
            ParseError::BlankField("alias")
        );
    }

    #[test]
    fn optional_fields_fall_back_when_malformed() {
        let payload = object(json!({
            "index": 70000,
            "location": { "latitude": "north", "longitude": 1.0 }
        }));
        assert_eq!(optional_index(&payload), 0);
        assert_eq!(optional_location(&payload), None);

        let payload = object(json!({
            "index": 4,
            "location": { "latitude": 34.02, "longitude": -118.28 }
        }));
        assert_eq!(optional_index(&payload), 4);
        let location = optional_location(&payload).unwrap();
        assert_eq!(location.latitude, 34.02);
    }
}
