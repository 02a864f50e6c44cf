use feast_core::db::open_store_in_memory;
use feast_core::{
    Location, ObjectId, RepoError, Restaurant, RestaurantRepository, RestaurantValidationError,
    SqliteRestaurantRepository, StoredRestaurant,
};

fn row(object_id: u64, identifier: &str, name: &str) -> StoredRestaurant {
    StoredRestaurant::new(ObjectId(object_id), Restaurant::new(identifier, name))
}

#[test]
fn insert_and_list_roundtrip_in_display_order() {
    let store = open_store_in_memory().unwrap();
    let repo = SqliteRestaurantRepository::new(&store.conn);

    let mut located = Restaurant::new("r2", "Cafe B");
    located.index = -1;
    located.location = Some(Location {
        latitude: 34.0205,
        longitude: -118.2856,
    });

    let inserted = repo
        .insert_restaurants(&[
            row(1, "r1", "Cafe A"),
            StoredRestaurant::new(ObjectId(2), located.clone()),
        ])
        .unwrap();
    assert_eq!(inserted, 2);

    let listed = repo.list_restaurants().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].object_id, ObjectId(2));
    assert_eq!(listed[0].restaurant, located);
    assert_eq!(listed[1].identifier(), "r1");
    assert_eq!(listed[1].restaurant.location, None);
    assert_eq!(repo.max_object_id().unwrap(), Some(ObjectId(2)));
}

#[test]
fn duplicate_identifiers_are_stored_as_separate_rows() {
    let store = open_store_in_memory().unwrap();
    let repo = SqliteRestaurantRepository::new(&store.conn);

    repo.insert_restaurants(&[row(1, "r1", "Cafe A")]).unwrap();
    repo.insert_restaurants(&[row(2, "r1", "Cafe A")]).unwrap();

    assert_eq!(repo.count_restaurants().unwrap(), 2);
}

#[test]
fn invalid_batch_writes_nothing() {
    let store = open_store_in_memory().unwrap();
    let repo = SqliteRestaurantRepository::new(&store.conn);

    let err = repo
        .insert_restaurants(&[row(1, "r1", "Cafe A"), row(2, "r2", "")])
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(RestaurantValidationError::EmptyName { ref identifier })
            if identifier == "r2"
    ));
    assert_eq!(repo.count_restaurants().unwrap(), 0);
    assert_eq!(repo.max_object_id().unwrap(), None);
}

#[test]
fn reused_object_id_fails_the_whole_batch() {
    let store = open_store_in_memory().unwrap();
    let repo = SqliteRestaurantRepository::new(&store.conn);

    repo.insert_restaurants(&[row(1, "r1", "Cafe A")]).unwrap();
    let err = repo
        .insert_restaurants(&[row(2, "r2", "Cafe B"), row(1, "r3", "Cafe C")])
        .unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));
    assert_eq!(repo.count_restaurants().unwrap(), 1);
}
