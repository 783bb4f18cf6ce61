//! Parsing logic for the Entity derive macro.
//!
//! This module extracts struct-level and field-level `#[entity(...)]`
//! attributes from the derive input to build the `EntityDef` and
//! `FieldDef` structures used for code generation.

use proc_macro2::Span;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Generics, Ident, Lit, Result, Type};

/// Parsed entity definition from a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `User`).
    pub name: Ident,
    /// Explicit table name from `#[entity(table = "...")]`.
    pub table_name: Option<String>,
    /// Parsed field definitions, ignored fields included.
    pub fields: Vec<FieldDef>,
    /// Generic parameters from the struct.
    pub generics: Generics,
}

impl EntityDef {
    /// Fields that map to columns.
    pub fn mapped_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.ignore)
    }
}

/// Concurrency-token policy named in `#[entity(token = "...")]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAttr {
    Version,
    Timestamp,
}

/// Parsed definition of one struct field.
#[derive(Debug)]
pub struct FieldDef {
    /// The Rust field name.
    pub name: Ident,
    /// The Rust type.
    pub ty: Type,
    /// Explicit column name.
    pub column: Option<String>,
    /// Part of the key.
    pub key: bool,
    /// Never written by INSERT or UPDATE.
    pub read_only: bool,
    /// Concurrency token policy.
    pub token: Option<TokenAttr>,
    /// Not mapped at all.
    pub ignore: bool,
}

/// Parse a `DeriveInput` into an `EntityDef`.
///
/// Returns an error if:
/// - The input is not a struct
/// - The struct uses tuple or unit syntax (must have named fields)
/// - Unknown or duplicate attributes are present
/// - A field combines `ignore` with any mapping attribute
pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();
    let generics = input.generics.clone();
    let table_name = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    Ok(EntityDef {
        name,
        table_name,
        fields,
        generics,
    })
}

/// Parse struct-level `#[entity(...)]` attributes.
///
/// Supported keys:
/// - `table = "name"` (overrides the naming convention)
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table_name: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                if table_name.is_some() {
                    return Err(Error::new_spanned(
                        meta.path,
                        "duplicate entity attribute: table",
                    ));
                }
                table_name = Some(string_value(&meta, "table name")?);
                Ok(())
            } else {
                Err(Error::new_spanned(
                    meta.path,
                    "unknown entity struct attribute (supported: table)",
                ))
            }
        })?;
    }

    Ok(table_name)
}

/// Parse all fields from a struct.
fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

/// Parse a single field and its attributes.
fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut def = FieldDef {
        name,
        ty: field.ty.clone(),
        column: None,
        key: false,
        read_only: false,
        token: None,
        ignore: false,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("key") {
                def.key = true;
            } else if path.is_ident("read_only") {
                def.read_only = true;
            } else if path.is_ident("ignore") {
                def.ignore = true;
            } else if path.is_ident("column") {
                if def.column.is_some() {
                    return Err(Error::new_spanned(path, "duplicate entity attribute: column"));
                }
                def.column = Some(string_value(&meta, "column name")?);
            } else if path.is_ident("token") {
                if def.token.is_some() {
                    return Err(Error::new_spanned(path, "duplicate entity attribute: token"));
                }
                def.token = Some(parse_token(&meta)?);
            } else {
                return Err(Error::new_spanned(
                    path,
                    "unknown entity field attribute (supported: key, read_only, column, token, ignore)",
                ));
            }
            Ok(())
        })?;
    }

    validate_field(&def)?;
    Ok(def)
}

/// Parse `token` as a flag (version) or `token = "version" | "timestamp"`.
fn parse_token(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<TokenAttr> {
    if !meta.input.peek(syn::Token![=]) {
        return Ok(TokenAttr::Version);
    }
    let value: Lit = meta.value()?.parse()?;
    let Lit::Str(lit_str) = &value else {
        return Err(Error::new_spanned(
            value,
            "expected string literal for token policy",
        ));
    };
    match lit_str.value().to_ascii_lowercase().as_str() {
        "version" | "rowversion" => Ok(TokenAttr::Version),
        "timestamp" => Ok(TokenAttr::Timestamp),
        _ => Err(Error::new_spanned(
            lit_str,
            "token must be one of: 'version', 'timestamp'",
        )),
    }
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<String> {
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Str(lit_str) => Ok(lit_str.value()),
        other => Err(Error::new_spanned(
            other,
            format!("expected string literal for {what}"),
        )),
    }
}

/// Reject attribute combinations that contradict each other.
fn validate_field(def: &FieldDef) -> Result<()> {
    if def.ignore && (def.key || def.read_only || def.token.is_some() || def.column.is_some()) {
        return Err(Error::new_spanned(
            &def.name,
            format!(
                "field `{}` is marked `ignore` and cannot carry key, read_only, column or token",
                def.name
            ),
        ));
    }
    if def.key && def.token.is_some() {
        return Err(Error::new_spanned(
            &def.name,
            format!("field `{}` cannot be both a key and a concurrency token", def.name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parse_entity_attributes() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "users")]
            struct User {
                #[entity(key, read_only)]
                id: i64,
                #[entity(column = "user_name")]
                name: String,
                #[entity(token = "timestamp")]
                changed: String,
                #[entity(ignore)]
                cache: Vec<u8>,
            }
        };

        let def = parse_entity(&input).unwrap();
        assert_eq!(def.name, "User");
        assert_eq!(def.table_name.as_deref(), Some("users"));
        assert_eq!(def.fields.len(), 4);
        assert!(def.fields[0].key && def.fields[0].read_only);
        assert_eq!(def.fields[1].column.as_deref(), Some("user_name"));
        assert_eq!(def.fields[2].token, Some(TokenAttr::Timestamp));
        assert_eq!(def.mapped_fields().count(), 3);
    }

    #[test]
    fn test_token_flag_defaults_to_version() {
        let input: DeriveInput = parse_quote! {
            struct Doc {
                #[entity(key)]
                id: i64,
                #[entity(token)]
                version: i32,
            }
        };

        let def = parse_entity(&input).unwrap();
        assert_eq!(def.table_name, None);
        assert_eq!(def.fields[1].token, Some(TokenAttr::Version));
    }

    #[test]
    fn test_key_and_ignore_conflict() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[entity(key, ignore)]
                id: i64,
            }
        };

        let err = parse_entity(&input).unwrap_err();
        assert!(err.to_string().contains("ignore"));
    }

    #[test]
    fn test_unknown_token_policy_errors() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[entity(token = "guid")]
                stamp: String,
            }
        };

        assert!(parse_entity(&input).is_err());
    }

    #[test]
    fn test_unknown_attribute_errors() {
        let input: DeriveInput = parse_quote! {
            #[entity(schema = "dbo")]
            struct User {
                id: i64,
            }
        };

        let err = parse_entity(&input).unwrap_err();
        assert!(err.to_string().contains("unknown entity struct attribute"));
    }

    #[test]
    fn test_duplicate_column_errors() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[entity(column = "a", column = "b")]
                name: String,
            }
        };

        assert!(parse_entity(&input).is_err());
    }

    #[test]
    fn test_tuple_struct_errors() {
        let input: DeriveInput = parse_quote! {
            struct Pair(i64, String);
        };

        let err = parse_entity(&input).unwrap_err();
        assert!(err.to_string().contains("named fields"));
    }

    #[test]
    fn test_enum_errors() {
        let input: DeriveInput = parse_quote! {
            enum Kind { A, B }
        };

        assert!(parse_entity(&input).is_err());
    }
}
