//! Procedural macros for sqlchain.
//!
//! `sqlchain-macros` is the **compile-time codegen layer**. `#[derive(Entity)]`
//! turns a struct into an `Entity` implementation: static member metadata
//! for the table metadata resolver and a `to_row` that exposes member values
//! for row-based writes.
//!
//! The macro is used by application crates via the `sqlchain` facade.

use proc_macro::TokenStream;
use syn::ext::IdentExt;

mod parse;

use parse::{EntityDef, TokenAttr, parse_entity};

/// Derive macro for the `Entity` trait.
///
/// # Attributes
///
/// - `#[entity(table = "name")]` - Override the table name (defaults to the
///   registry naming convention applied to the struct name)
/// - `#[entity(key)]` - Mark field as part of the key
/// - `#[entity(read_only)]` - Never write this field (identity, computed)
/// - `#[entity(column = "name")]` - Override column name
/// - `#[entity(token)]` / `#[entity(token = "timestamp")]` - Concurrency token
/// - `#[entity(ignore)]` - Not mapped
///
/// # Example
///
/// ```ignore
/// use sqlchain::Entity;
///
/// #[derive(Entity)]
/// #[entity(table = "users")]
/// struct User {
///     #[entity(key, read_only)]
///     id: i64,
///
///     #[entity(column = "user_name")]
///     name: String,
///
///     #[entity(token)]
///     version: i32,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_entity_impl(&entity).into()
}

/// Generate the Entity trait implementation from a parsed definition.
fn generate_entity_impl(entity: &EntityDef) -> proc_macro2::TokenStream {
    let name = &entity.name;
    let type_name = name.unraw().to_string();
    let (impl_generics, ty_generics, where_clause) = entity.generics.split_for_impl();

    let table_name_ts = match &entity.table_name {
        Some(table) => quote::quote! { Some(#table) },
        None => quote::quote! { None },
    };

    let field_infos = generate_field_infos(entity);
    let to_row_body = generate_to_row(entity);

    quote::quote! {
        impl #impl_generics sqlchain_core::Entity for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
            const TABLE_NAME: Option<&'static str> = #table_name_ts;

            fn fields() -> &'static [sqlchain_core::FieldInfo] {
                static FIELDS: &[sqlchain_core::FieldInfo] = &[
                    #field_infos
                ];
                FIELDS
            }

            fn to_row(&self) -> Vec<(&'static str, sqlchain_core::Value)> {
                #to_row_body
            }
        }
    }
}

/// Generate the static `FieldInfo` array entries.
fn generate_field_infos(entity: &EntityDef) -> proc_macro2::TokenStream {
    let infos = entity.mapped_fields().map(|field| {
        let member = field.name.unraw().to_string();
        let key = field.key;
        let read_only = field.read_only;
        let column_ts = match &field.column {
            Some(column) => quote::quote! { Some(#column) },
            None => quote::quote! { None },
        };
        let token_ts = match field.token {
            Some(TokenAttr::Version) => quote::quote! { Some(sqlchain_core::TokenPolicy::Version) },
            Some(TokenAttr::Timestamp) => {
                quote::quote! { Some(sqlchain_core::TokenPolicy::Timestamp) }
            }
            None => quote::quote! { None },
        };

        quote::quote! {
            sqlchain_core::FieldInfo::new(#member)
                .column_opt(#column_ts)
                .key(#key)
                .read_only(#read_only)
                .token_opt(#token_ts)
        }
    });

    quote::quote! { #(#infos),* }
}

/// Generate the `to_row` method body.
fn generate_to_row(entity: &EntityDef) -> proc_macro2::TokenStream {
    let conversions = entity.mapped_fields().map(|field| {
        let field_name = &field.name;
        let member = field.name.unraw().to_string();
        quote::quote! {
            (#member, sqlchain_core::Value::from(self.#field_name.clone()))
        }
    });

    quote::quote! {
        vec![#(#conversions),*]
    }
}
