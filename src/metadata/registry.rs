use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{EntryError, Result};
use crate::metadata::{AccessPath, MemberEntryMetadata, MemberKind, PropertyAccessors};
use crate::model::{
    Access, ClassDef, ClassKind, DataType, Instance, Multiplicity, PropertyDef, RelationshipDef, Schema, Value,
};

/// Creates new entity objects on behalf of the tracker.
pub trait ObjectFactory: Send + Sync {
    fn create(&self, class: &ClassDef, properties: &[&PropertyDef]) -> Instance;
}

/// Builds an instance declaring every accessible property as null.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
    fn create(&self, class: &ClassDef, properties: &[&PropertyDef]) -> Instance {
        declared_instance(&class.name, properties)
    }
}

fn declared_instance(class: &str, properties: &[&PropertyDef]) -> Instance {
    let mut instance = Instance::new(class);
    for property in properties.iter().filter(|p| p.access != Access::None) {
        instance.set(property.name.clone(), Value::Null);
    }
    instance
}

/// Per-class view with inheritance already flattened (base members first).
struct ClassInfo {
    def: ClassDef,
    root: String,
    properties: Vec<PropertyDef>,
    relationships: Vec<RelationshipDef>,
    mapped: Vec<String>,
}

/// Model metadata resolved once, at model-build time.
///
/// Every (class, member) pair gets its [`MemberEntryMetadata`] and accessor
/// vtable during [`MetadataRegistry::build`]; afterwards the registry is
/// read-only and can be shared freely across threads and contexts.
pub struct MetadataRegistry {
    namespace: String,
    classes: HashMap<String, ClassInfo>,
    members: HashMap<(String, String), Arc<MemberEntryMetadata>>,
    factory: Arc<dyn ObjectFactory>,
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("namespace", &self.namespace)
            .field("classes", &self.classes.len())
            .field("members", &self.members.len())
            .finish()
    }
}

impl MetadataRegistry {
    pub fn build(schema: Schema) -> Result<Self> {
        Self::build_with_factory(schema, Arc::new(DefaultObjectFactory))
    }

    pub fn build_with_factory(schema: Schema, factory: Arc<dyn ObjectFactory>) -> Result<Self> {
        let namespace = schema.name.clone().unwrap_or_else(|| "Model".to_string());

        let mut defs: HashMap<String, ClassDef> = HashMap::new();
        for class in schema.classes {
            if defs.contains_key(&class.name) {
                return Err(invalid(format!("class '{}' is defined twice", class.name)));
            }
            defs.insert(class.name.clone(), class);
        }

        let mut classes = HashMap::new();
        for name in defs.keys() {
            let info = flatten(name, &defs)?;
            classes.insert(name.clone(), info);
        }

        let mut registry = Self {
            namespace,
            classes,
            members: HashMap::new(),
            factory,
        };
        registry.validate()?;
        registry.build_members();

        info!(
            "Built metadata registry for '{}': {} classes, {} members",
            registry.namespace,
            registry.classes.len(),
            registry.members.len()
        );
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        for info in self.classes.values() {
            let class = &info.def.name;
            for property in &info.properties {
                if let DataType::Complex(target) = &property.data_type {
                    match self.classes.get(target) {
                        Some(t) if t.def.kind == ClassKind::Complex => {}
                        _ => {
                            return Err(invalid(format!(
                                "property '{class}.{}' names '{target}' which is not a complex class",
                                property.name
                            )))
                        }
                    }
                }
            }
            if info.def.kind == ClassKind::Complex {
                self.check_complex_cycle(class, &mut Vec::new())?;
                if !info.relationships.is_empty() {
                    return Err(invalid(format!("complex class '{class}' cannot declare navigations")));
                }
                continue;
            }

            let root = &self.classes[&info.root];
            if root.def.key.is_empty() {
                return Err(invalid(format!("entity class '{class}' has no key")));
            }
            for key in &root.def.key {
                match info.properties.iter().find(|p| &p.name == key) {
                    Some(p) if !p.is_complex() && p.mapped => {}
                    _ => {
                        return Err(invalid(format!(
                            "key '{key}' of '{class}' is not a mapped scalar property"
                        )))
                    }
                }
            }
            for relationship in &info.relationships {
                match self.classes.get(&relationship.target) {
                    Some(t) if t.def.kind == ClassKind::Entity => {}
                    _ => {
                        return Err(invalid(format!(
                            "navigation '{class}.{}' targets '{}' which is not an entity class",
                            relationship.name, relationship.target
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn check_complex_cycle(&self, class: &str, stack: &mut Vec<String>) -> Result<()> {
        if stack.iter().any(|c| c == class) {
            stack.push(class.to_string());
            return Err(invalid(format!("complex types nest cyclically: {}", stack.join(" -> "))));
        }
        stack.push(class.to_string());
        if let Some(info) = self.classes.get(class) {
            for property in &info.properties {
                if let DataType::Complex(target) = &property.data_type {
                    self.check_complex_cycle(target, stack)?;
                }
            }
        }
        stack.pop();
        Ok(())
    }

    fn build_members(&mut self) {
        let mut members = HashMap::new();
        for (class, info) in &self.classes {
            for property in &info.properties {
                let kind = if property.is_complex() {
                    MemberKind::ComplexProperty
                } else {
                    MemberKind::ScalarProperty
                };
                let metadata = MemberEntryMetadata {
                    declaring_type: class.clone(),
                    element_type: property.data_type.type_name().to_string(),
                    name: property.name.clone(),
                    kind,
                    mapped: property.mapped,
                    nullable: property.nullable,
                    accessors: PropertyAccessors::for_access(property.access),
                    relationship: None,
                };
                members.insert((class.clone(), property.name.clone()), Arc::new(metadata));
            }
            for relationship in &info.relationships {
                let kind = if relationship.is_collection() {
                    MemberKind::CollectionNavigation
                } else {
                    MemberKind::ReferenceNavigation
                };
                let metadata = MemberEntryMetadata {
                    declaring_type: class.clone(),
                    element_type: relationship.target.clone(),
                    name: relationship.name.clone(),
                    kind,
                    mapped: true,
                    nullable: relationship.multiplicity != Multiplicity::One,
                    accessors: PropertyAccessors::read_write(),
                    relationship: Some(relationship.clone()),
                };
                members.insert((class.clone(), relationship.name.clone()), Arc::new(metadata));
            }
        }
        debug!("Resolved {} member metadata entries", members.len());
        self.members = members;
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn class(&self, name: &str) -> Result<&ClassDef> {
        self.info(name).map(|info| &info.def)
    }

    fn info(&self, name: &str) -> Result<&ClassInfo> {
        self.classes
            .get(name)
            .ok_or_else(|| EntryError::NotAnEntityType {
                class: name.to_string(),
            })
    }

    pub fn is_entity(&self, class: &str) -> bool {
        self.classes
            .get(class)
            .is_some_and(|info| info.def.kind == ClassKind::Entity)
    }

    pub fn member(&self, class: &str, name: &str) -> Option<&Arc<MemberEntryMetadata>> {
        self.members.get(&(class.to_string(), name.to_string()))
    }

    /// Scalar or complex property metadata, or `None` for navigations and unknown names
    pub fn property_member(&self, class: &str, name: &str) -> Option<&Arc<MemberEntryMetadata>> {
        self.member(class, name).filter(|m| m.kind().is_property())
    }

    pub fn navigation_member(&self, class: &str, name: &str) -> Option<&Arc<MemberEntryMetadata>> {
        self.member(class, name).filter(|m| m.kind().is_navigation())
    }

    /// All properties of a class, inherited ones first
    pub fn properties(&self, class: &str) -> Result<&[PropertyDef]> {
        self.info(class).map(|info| info.properties.as_slice())
    }

    pub fn property(&self, class: &str, name: &str) -> Option<&PropertyDef> {
        self.classes
            .get(class)
            .and_then(|info| info.properties.iter().find(|p| p.name == name))
    }

    pub fn relationships(&self, class: &str) -> Result<&[RelationshipDef]> {
        self.info(class).map(|info| info.relationships.as_slice())
    }

    /// Names of the properties the tracking record holds, in declaration order
    pub fn mapped_properties(&self, class: &str) -> Result<&[String]> {
        self.info(class).map(|info| info.mapped.as_slice())
    }

    pub fn key_properties(&self, class: &str) -> Result<&[String]> {
        let info = self.info(class)?;
        Ok(self.classes[&info.root].def.key.as_slice())
    }

    pub fn entity_set(&self, class: &str) -> Result<String> {
        let info = self.info(class)?;
        let root = &self.classes[&info.root].def;
        Ok(root.entity_set.clone().unwrap_or_else(|| root.name.clone()))
    }

    /// `target` is the same class as `source` or one of its bases
    pub fn is_assignable(&self, target: &str, source: &str) -> bool {
        let mut current = Some(source.to_string());
        while let Some(name) = current {
            if name == target {
                return true;
            }
            current = self.classes.get(&name).and_then(|info| info.def.base.clone());
        }
        false
    }

    /// `None` accepts any type
    pub fn is_requested_type(&self, requested: Option<&str>, actual: &str) -> bool {
        requested.map_or(true, |requested| self.is_assignable(requested, actual))
    }

    /// The class and every class deriving from it
    pub fn types_assignable_to(&self, class: &str) -> Vec<String> {
        let mut types: Vec<String> = self
            .classes
            .keys()
            .filter(|name| self.is_assignable(class, name))
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Accessors composed along a dotted path of property names
    pub fn access_path(&self, class: &str, path: &[String]) -> Option<AccessPath> {
        let mut current_class = class.to_string();
        let mut access: Option<AccessPath> = None;
        for name in path {
            let member = self.property_member(&current_class, name)?;
            access = Some(match access {
                None => AccessPath::root(name.clone(), member.accessors()),
                Some(parent) => parent.child(name.clone(), member.accessors()),
            });
            current_class = member.element_type().to_string();
        }
        access
    }

    /// New object for the class: entities come from the factory, complex
    /// values are plain instances
    pub fn new_instance(&self, class: &str) -> Result<Instance> {
        let info = self.info(class)?;
        let properties: Vec<&PropertyDef> = info.properties.iter().collect();
        Ok(match info.def.kind {
            ClassKind::Entity => self.factory.create(&info.def, &properties),
            ClassKind::Complex => declared_instance(class, &properties),
        })
    }
}

fn invalid(message: String) -> EntryError {
    EntryError::InvalidModel(message)
}

fn flatten(name: &str, defs: &HashMap<String, ClassDef>) -> Result<ClassInfo> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(name.to_string());
    while let Some(class) = current {
        if !seen.insert(class.clone()) {
            return Err(invalid(format!("class '{name}' has a cyclic base chain")));
        }
        let def = defs
            .get(&class)
            .ok_or_else(|| invalid(format!("base class '{class}' of '{name}' is not defined")))?;
        current = def.base.clone();
        chain.push(def);
    }

    let kind = chain[0].kind;
    if chain.iter().any(|def| def.kind != kind) {
        return Err(invalid(format!("class '{name}' mixes entity and complex bases")));
    }

    let mut properties: Vec<PropertyDef> = Vec::new();
    let mut relationships: Vec<RelationshipDef> = Vec::new();
    for def in chain.iter().rev() {
        for property in &def.properties {
            if properties.iter().any(|p| p.name == property.name)
                || relationships.iter().any(|r| r.name == property.name)
            {
                return Err(invalid(format!("member '{}' is declared twice on '{name}'", property.name)));
            }
            properties.push(property.clone());
        }
        for relationship in &def.relationships {
            if properties.iter().any(|p| p.name == relationship.name)
                || relationships.iter().any(|r| r.name == relationship.name)
            {
                return Err(invalid(format!(
                    "member '{}' is declared twice on '{name}'",
                    relationship.name
                )));
            }
            if relationship.join.is_empty() {
                return Err(invalid(format!(
                    "navigation '{name}.{}' has no join columns",
                    relationship.name
                )));
            }
            relationships.push(relationship.clone());
        }
    }

    let mapped = properties
        .iter()
        .filter(|p| p.mapped)
        .map(|p| p.name.clone())
        .collect();
    let root = chain.last().map(|def| def.name.clone()).unwrap_or_else(|| name.to_string());

    Ok(ClassInfo {
        def: chain[0].clone(),
        root,
        properties,
        relationships,
        mapped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::person_schema;

    #[test]
    fn test_members_are_resolved_per_kind() {
        let registry = MetadataRegistry::build(person_schema()).unwrap();

        let name = registry.member("Person", "Name").unwrap();
        assert_eq!(name.kind(), MemberKind::ScalarProperty);
        assert_eq!(name.element_type(), "String");

        let home = registry.member("Person", "Home").unwrap();
        assert_eq!(home.kind(), MemberKind::ComplexProperty);
        assert_eq!(home.element_type(), "Address");

        let orders = registry.member("Person", "Orders").unwrap();
        assert_eq!(orders.kind(), MemberKind::CollectionNavigation);
        let owner = registry.member("Order", "Owner").unwrap();
        assert_eq!(owner.kind(), MemberKind::ReferenceNavigation);

        assert!(registry.member("Person", "NoSuchField").is_none());
    }

    #[test]
    fn test_inherited_members_and_assignability() {
        let registry = MetadataRegistry::build(person_schema()).unwrap();

        assert!(registry.member("Employee", "Name").is_some());
        assert!(registry.member("Employee", "Salary").is_some());
        assert!(registry.is_assignable("Person", "Employee"));
        assert!(!registry.is_assignable("Employee", "Person"));
        assert_eq!(registry.entity_set("Employee").unwrap(), "People");
        assert_eq!(registry.key_properties("Employee").unwrap(), ["Id".to_string()]);
        assert_eq!(
            registry.types_assignable_to("Person"),
            vec!["Employee".to_string(), "Person".to_string()]
        );
    }

    #[test]
    fn test_unmapped_properties_are_not_record_fields() {
        let registry = MetadataRegistry::build(person_schema()).unwrap();
        let mapped = registry.mapped_properties("Person").unwrap();

        assert!(mapped.contains(&"Name".to_string()));
        assert!(!mapped.contains(&"Nickname".to_string()));
        assert!(!registry.member("Person", "Nickname").unwrap().is_mapped());
    }

    #[test]
    fn test_complex_cycles_are_rejected() {
        let schema = Schema::new("Broken").with_class(
            ClassDef::complex("Node").with_property(PropertyDef::complex("Next", "Node")),
        );

        let err = MetadataRegistry::build(schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
    }

    #[test]
    fn test_entities_require_a_scalar_key() {
        let schema = Schema::new("Broken").with_class(
            ClassDef::entity("Thing")
                .with_property(PropertyDef::scalar("Name", DataType::String)),
        );

        assert!(MetadataRegistry::build(schema).is_err());
    }
}
