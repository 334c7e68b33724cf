use crate::model::{Access, ClassDef, DataType, Instance, PropertyDef, RelationshipDef, Schema};
use crate::store::InMemoryStore;

/// People and their orders, with an embedded address and a shadow-state
/// `Notes` column the objects never see. Orders carry a read-only `Code`
/// and a write-only `Memo`.
pub fn demo_schema() -> Schema {
    Schema::new("Model")
        .with_class(
            ClassDef::entity("Person")
                .in_set("People")
                .with_key(["Id"])
                .with_property(PropertyDef::scalar("Id", DataType::Number).required())
                .with_property(PropertyDef::scalar("Name", DataType::String).required())
                .with_property(PropertyDef::scalar("Age", DataType::Number))
                .with_property(PropertyDef::complex("Home", "Address"))
                .with_property(
                    PropertyDef::scalar("Notes", DataType::String).with_access(Access::None),
                )
                .with_property(PropertyDef::scalar("Nickname", DataType::String).unmapped())
                .with_relationship(
                    RelationshipDef::collection("Orders", "Order").join_on("Id", "OwnerId"),
                ),
        )
        .with_class(
            ClassDef::entity("Employee")
                .with_base("Person")
                .with_property(PropertyDef::scalar("Salary", DataType::Number)),
        )
        .with_class(
            ClassDef::entity("Order")
                .in_set("Orders")
                .with_key(["Id"])
                .with_property(PropertyDef::scalar("Id", DataType::Number).required())
                .with_property(PropertyDef::scalar("OwnerId", DataType::Number))
                .with_property(PropertyDef::scalar("Total", DataType::Number))
                .with_property(
                    PropertyDef::scalar("Code", DataType::String).with_access(Access::ReadOnly),
                )
                .with_property(
                    PropertyDef::scalar("Memo", DataType::String).with_access(Access::WriteOnly),
                )
                .with_relationship(
                    RelationshipDef::reference("Owner", "Person")
                        .required()
                        .join_on("OwnerId", "Id"),
                ),
        )
        .with_class(
            ClassDef::complex("Address")
                .with_property(PropertyDef::scalar("Street", DataType::String))
                .with_property(PropertyDef::scalar("City", DataType::String).required())
                .with_property(PropertyDef::scalar("Zip", DataType::String))
                .with_property(PropertyDef::complex("Location", "Geo")),
        )
        .with_class(
            ClassDef::complex("Geo")
                .with_property(PropertyDef::scalar("Lat", DataType::Number))
                .with_property(PropertyDef::scalar("Lon", DataType::Number)),
        )
}

pub fn address(city: &str, zip: &str) -> Instance {
    Instance::new("Address")
        .with("Street", "Main St 1")
        .with("City", city)
        .with("Zip", zip)
        .with(
            "Location",
            Instance::new("Geo").with("Lat", 59.91).with("Lon", 10.75),
        )
}

pub fn person(id: i64, name: &str, age: i64) -> Instance {
    Instance::new("Person")
        .with("Id", id)
        .with("Name", name)
        .with("Age", age)
        .with("Home", address("Oslo", "0150"))
}

pub fn order(id: i64, owner_id: i64, total: f64) -> Instance {
    Instance::new("Order")
        .with("Id", id)
        .with("OwnerId", owner_id)
        .with("Total", total)
}

/// Fill `store` with the rows the demo walks through
pub fn load_seed_data(store: &InMemoryStore) {
    store.insert(
        "People",
        person(1, "Alice", 30).with("Notes", "prefers email"),
    );
    store.insert(
        "People",
        Instance::new("Employee")
            .with("Id", 2)
            .with("Name", "Bob")
            .with("Age", 41)
            .with("Home", address("Bergen", "5003"))
            .with("Salary", 52000),
    );
    store.insert("Orders", order(100, 1, 249.0).with("Code", "ORD-100"));
    store.insert("Orders", order(101, 1, 17.5).with("Code", "ORD-101").with("Memo", "gift wrap"));
    store.insert("Orders", order(102, 2, 99.9).with("Code", "ORD-102"));
}
