//! Schema discovery and the type index used during resolution.
//!
//! Schema files are discovered under the configured locations (`*.graphql` and `*.graphqls`,
//! recursively) and combined with inline definitions. Type extensions (`extend type Query`) may
//! live in a different file than the type they extend.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use graphql_parser::schema::{self as ast, parse_schema, Definition, TypeDefinition, TypeExtension};
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::ExecutorError;
use crate::executor::utils::const_value_to_json;

const SCHEMA_EXTENSIONS: &[&str] = &["graphql", "graphqls"];
const BUILT_IN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

/// A field or argument type as written in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    fn from_ast(ty: &ast::Type<'_, String>) -> Self {
        match ty {
            ast::Type::NamedType(name) => TypeRef::Named(name.clone()),
            ast::Type::ListType(inner) => TypeRef::List(Box::new(Self::from_ast(inner))),
            ast::Type::NonNullType(inner) => TypeRef::NonNull(Box::new(Self::from_ast(inner))),
        }
    }

    /// The innermost named type.
    pub fn named(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentDef {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub arguments: Vec<ArgumentDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub fields: HashMap<String, FieldDef>,
    /// Member types of a union.
    pub members: Vec<String>,
    /// Interfaces an object type implements.
    pub interfaces: Vec<String>,
}

impl TypeDef {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            fields: HashMap::new(),
            members: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    fn add_fields(&mut self, fields: &[ast::Field<'_, String>]) {
        for field in fields {
            let arguments = field
                .arguments
                .iter()
                .map(|arg| ArgumentDef {
                    name: arg.name.clone(),
                    ty: TypeRef::from_ast(&arg.value_type),
                    default_value: arg.default_value.as_ref().map(const_value_to_json),
                })
                .collect();
            self.fields.insert(
                field.name.clone(),
                FieldDef { name: field.name.clone(), ty: TypeRef::from_ast(&field.field_type), arguments },
            );
        }
    }
}

/// The parsed schema: every named type plus the root operation types.
#[derive(Debug, Clone)]
pub struct Schema {
    types: HashMap<String, TypeDef>,
    query_type: String,
    mutation_type: Option<String>,
}

impl Schema {
    /// Discovers schema files under `locations` and combines them with `inline` definitions.
    ///
    /// Locations that do not exist are skipped. Finding no schema at all is an error.
    pub fn load(locations: &[PathBuf], inline: &[String]) -> Result<Self, ExecutorError> {
        let mut files = Vec::new();
        for location in locations {
            collect_schema_files(location, &mut files)?;
        }
        files.sort();

        let mut sources = Vec::with_capacity(files.len() + inline.len());
        for path in files {
            let sdl = std::fs::read_to_string(&path)
                .map_err(|source| ExecutorError::SchemaRead { path: path.clone(), source })?;
            sources.push((path.display().to_string(), sdl));
        }
        sources.extend(
            inline.iter().enumerate().map(|(i, sdl)| (format!("inline schema #{}", i + 1), sdl.clone())),
        );

        if sources.is_empty() {
            return Err(ExecutorError::SchemaNotFound { locations: locations.to_vec() });
        }
        tracing::debug!(sources = ?sources.iter().map(|(origin, _)| origin).collect::<Vec<_>>(), "loading schema");
        Self::parse(&sources)
    }

    /// Builds the type index from `(origin, sdl)` pairs.
    pub fn parse(sources: &[(String, String)]) -> Result<Self, ExecutorError> {
        let mut documents = Vec::with_capacity(sources.len());
        for (origin, sdl) in sources {
            let document = parse_schema::<String>(sdl).map_err(|e| ExecutorError::SchemaParse {
                origin: origin.clone(),
                message: e.to_string(),
            })?;
            documents.push(document);
        }

        let mut types: HashMap<String, TypeDef> = BUILT_IN_SCALARS
            .iter()
            .map(|name| (name.to_string(), TypeDef::new(name, TypeKind::Scalar)))
            .collect();
        let mut query_type = None;
        let mut mutation_type = None;

        for definition in documents.iter().flat_map(|doc| doc.definitions.iter()) {
            match definition {
                Definition::SchemaDefinition(schema) => {
                    query_type = schema.query.clone().or(query_type);
                    mutation_type = schema.mutation.clone().or(mutation_type);
                }
                Definition::TypeDefinition(def) => {
                    let type_def = match def {
                        TypeDefinition::Scalar(t) => TypeDef::new(&t.name, TypeKind::Scalar),
                        TypeDefinition::Object(t) => {
                            let mut type_def = TypeDef::new(&t.name, TypeKind::Object);
                            type_def.add_fields(&t.fields);
                            type_def.interfaces = t.implements_interfaces.clone();
                            type_def
                        }
                        TypeDefinition::Interface(t) => {
                            let mut type_def = TypeDef::new(&t.name, TypeKind::Interface);
                            type_def.add_fields(&t.fields);
                            type_def
                        }
                        TypeDefinition::Union(t) => {
                            let mut type_def = TypeDef::new(&t.name, TypeKind::Union);
                            type_def.members = t.types.clone();
                            type_def
                        }
                        TypeDefinition::Enum(t) => TypeDef::new(&t.name, TypeKind::Enum),
                        TypeDefinition::InputObject(t) => TypeDef::new(&t.name, TypeKind::InputObject),
                    };
                    if types.insert(type_def.name.clone(), type_def).is_some() {
                        return Err(ExecutorError::SchemaParse {
                            origin: "schema".to_owned(),
                            message: format!("type '{}' is defined more than once", def_name(def)),
                        });
                    }
                }
                Definition::TypeExtension(_) | Definition::DirectiveDefinition(_) => {}
            }
        }

        // Extensions may precede their base definition in file order.
        for definition in documents.iter().flat_map(|doc| doc.definitions.iter()) {
            if let Definition::TypeExtension(extension) = definition {
                apply_extension(&mut types, extension)?;
            }
        }

        let query_type = query_type.unwrap_or_else(|| "Query".to_owned());
        match types.get(&query_type) {
            Some(def) if def.kind == TypeKind::Object => {}
            _ => {
                return Err(ExecutorError::SchemaParse {
                    origin: "schema".to_owned(),
                    message: format!("query root type '{}' is not defined", query_type),
                })
            }
        }
        let mutation_type =
            mutation_type.or_else(|| types.contains_key("Mutation").then(|| "Mutation".to_owned()));

        Ok(Self { types, query_type, mutation_type })
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.types.get(type_name).and_then(|t| t.fields.get(field_name))
    }

    /// Whether values of this type are resolved through a selection set.
    pub fn is_composite(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name).map(|t| t.kind),
            Some(TypeKind::Object | TypeKind::Interface | TypeKind::Union)
        )
    }

    pub fn is_abstract(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name).map(|t| t.kind),
            Some(TypeKind::Interface | TypeKind::Union)
        )
    }

    /// Whether an object of type `object_type` satisfies a fragment condition on `condition`.
    pub fn type_applies(&self, object_type: &str, condition: &str) -> bool {
        if object_type == condition {
            return true;
        }
        match self.types.get(condition) {
            Some(TypeDef { kind: TypeKind::Union, members, .. }) => members.iter().any(|m| m == object_type),
            Some(TypeDef { kind: TypeKind::Interface, .. }) => self
                .types
                .get(object_type)
                .map(|object| object.interfaces.iter().any(|i| i == condition))
                .unwrap_or(false),
            _ => false,
        }
    }
}

fn def_name<'a>(def: &'a TypeDefinition<'_, String>) -> &'a str {
    match def {
        TypeDefinition::Scalar(t) => &t.name,
        TypeDefinition::Object(t) => &t.name,
        TypeDefinition::Interface(t) => &t.name,
        TypeDefinition::Union(t) => &t.name,
        TypeDefinition::Enum(t) => &t.name,
        TypeDefinition::InputObject(t) => &t.name,
    }
}

fn apply_extension(
    types: &mut HashMap<String, TypeDef>,
    extension: &TypeExtension<'_, String>,
) -> Result<(), ExecutorError> {
    let (name, fields, members, interfaces) = match extension {
        TypeExtension::Object(ext) => {
            (ext.name.as_str(), ext.fields.as_slice(), &[][..], ext.implements_interfaces.as_slice())
        }
        TypeExtension::Interface(ext) => (ext.name.as_str(), ext.fields.as_slice(), &[][..], &[][..]),
        TypeExtension::Union(ext) => (ext.name.as_str(), &[][..], ext.types.as_slice(), &[][..]),
        TypeExtension::Scalar(ext) => (ext.name.as_str(), &[][..], &[][..], &[][..]),
        TypeExtension::Enum(ext) => (ext.name.as_str(), &[][..], &[][..], &[][..]),
        TypeExtension::InputObject(ext) => (ext.name.as_str(), &[][..], &[][..], &[][..]),
    };
    let type_def = types.get_mut(name).ok_or_else(|| ExecutorError::SchemaParse {
        origin: "schema".to_owned(),
        message: format!("cannot extend undefined type '{}'", name),
    })?;
    type_def.add_fields(fields);
    type_def.members.extend(members.iter().cloned());
    type_def.interfaces.extend(interfaces.iter().cloned());
    Ok(())
}

/// Symbolic links below `location` are not followed.
fn collect_schema_files(location: &Path, files: &mut Vec<PathBuf>) -> Result<(), ExecutorError> {
    if !location.exists() {
        tracing::debug!(?location, "schema location does not exist");
        return Ok(());
    }
    for entry in WalkDir::new(location) {
        let entry = entry.map_err(|e| ExecutorError::SchemaRead {
            path: e.path().unwrap_or(location).to_owned(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && has_schema_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(())
}

fn has_schema_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCHEMA_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
