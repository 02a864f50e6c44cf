//! Restaurant repository contract and SQLite implementation.
//!
//! # Invariants
//! - A batch insert is one transaction: all rows land or none do.
//! - Reads reject persisted rows that no longer validate.

use crate::db::DbError;
use crate::model::restaurant::{
    Location, ObjectId, Restaurant, RestaurantValidationError, StoredRestaurant,
};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const RESTAURANT_SELECT_SQL: &str = "SELECT
    object_id,
    identifier,
    idx,
    name,
    latitude,
    longitude
FROM restaurants";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for restaurant persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(RestaurantValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted restaurant data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<RestaurantValidationError> for RepoError {
    fn from(value: RestaurantValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Data access contract used by the persistent lane.
pub trait RestaurantRepository {
    fn insert_restaurants(&self, rows: &[StoredRestaurant]) -> RepoResult<usize>;
    fn list_restaurants(&self) -> RepoResult<Vec<StoredRestaurant>>;
    fn count_restaurants(&self) -> RepoResult<u64>;
    fn max_object_id(&self) -> RepoResult<Option<ObjectId>>;
}

/// SQLite-backed restaurant repository.
pub struct SqliteRestaurantRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRestaurantRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RestaurantRepository for SqliteRestaurantRepository<'_> {
    fn insert_restaurants(&self, rows: &[StoredRestaurant]) -> RepoResult<usize> {
        for row in rows {
            row.restaurant.validate()?;
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO restaurants (
                    object_id,
                    identifier,
                    idx,
                    name,
                    latitude,
                    longitude
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for row in rows {
                let restaurant = &row.restaurant;
                stmt.execute(params![
                    object_id_to_db(row.object_id)?,
                    restaurant.identifier.as_str(),
                    i64::from(restaurant.index),
                    restaurant.name.as_str(),
                    restaurant.location.map(|location| location.latitude),
                    restaurant.location.map(|location| location.longitude),
                ])?;
            }
        }
        tx.commit()?;

        Ok(rows.len())
    }

    fn list_restaurants(&self) -> RepoResult<Vec<StoredRestaurant>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RESTAURANT_SELECT_SQL} ORDER BY idx ASC, object_id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut restaurants = Vec::new();

        while let Some(row) = rows.next()? {
            restaurants.push(parse_restaurant_row(row)?);
        }

        Ok(restaurants)
    }

    fn count_restaurants(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM restaurants;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn max_object_id(&self) -> RepoResult<Option<ObjectId>> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(object_id) FROM restaurants;", [], |row| {
                    row.get(0)
                })?;
        max.map(object_id_from_db).transpose()
    }
}

fn parse_restaurant_row(row: &Row<'_>) -> RepoResult<StoredRestaurant> {
    let object_id = object_id_from_db(row.get("object_id")?)?;

    let idx: i64 = row.get("idx")?;
    let index = i16::try_from(idx).map_err(|_| {
        RepoError::InvalidData(format!("index `{idx}` out of range in restaurants.idx"))
    })?;

    let location = match (
        row.get::<_, Option<f64>>("latitude")?,
        row.get::<_, Option<f64>>("longitude")?,
    ) {
        (Some(latitude), Some(longitude)) => Some(Location {
            latitude,
            longitude,
        }),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "half-set location for {object_id}"
            )));
        }
    };

    let restaurant = Restaurant {
        identifier: row.get("identifier")?,
        index,
        location,
        name: row.get("name")?,
    };
    restaurant.validate()?;
    Ok(StoredRestaurant::new(object_id, restaurant))
}

fn object_id_to_db(id: ObjectId) -> RepoResult<i64> {
    i64::try_from(id.0).map_err(|_| RepoError::InvalidData(format!("{id} exceeds i64 range")))
}

fn object_id_from_db(value: i64) -> RepoResult<ObjectId> {
    u64::try_from(value)
        .map(ObjectId)
        .map_err(|_| RepoError::InvalidData(format!("negative object_id `{value}`")))
}
