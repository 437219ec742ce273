//! Derive macro for declaring record types to `tablesync`.
//!
//! This crate provides the `#[derive(Entity)]` macro, which turns a struct
//! declaration into an explicit `EntityDef` and registers the type so a
//! synchronization pass picks it up.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Lit, Meta};

/// Derives `tablesync::Entity` for a struct and registers it.
///
/// # Attributes
///
/// - `#[entity(table = "table_name")]` - Specifies the SQL table name
///   (optional, defaults to the struct name)
///
/// # Field Attributes
///
/// - `#[column(primary_key)]` - Marks the field as the primary key
/// - `#[column(name = "column_name")]` - Specifies the SQL column name
///   (optional, defaults to the field name)
/// - `#[column(sql_type = "VARCHAR(64)")]` - Forces the SQL type
/// - `#[column(ignore)]` - Excludes the field from mapping
///
/// Field types are recognized by name: `Uuid`, `String`, `i32`, `i64`,
/// `bool`, `NaiveDateTime`/`DateTime<_>`, `f64`, `Decimal`, optionally
/// wrapped in `Option<_>`. Anything else maps to `TEXT` unless `sql_type`
/// is given.
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_entity_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_entity_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let entity_name = struct_name.unraw().to_string();

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity derive does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity derive only supports structs",
            ));
        }
    };

    let table_call = match get_table_name(&input.attrs)? {
        Some(table) => quote! { .table(#table) },
        None => quote! {},
    };

    let mut field_defs: Vec<TokenStream2> = Vec::new();
    let mut primary_keys = 0usize;
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let field_name = ident.unraw().to_string();
        let field_type = &field.ty;
        let rust_type_str = quote!(#field_type).to_string().replace(' ', "");
        let attrs = parse_column_attrs(&field.attrs)?;

        if attrs.primary_key && !attrs.ignore {
            primary_keys += 1;
            if primary_keys > 1 {
                return Err(syn::Error::new_spanned(
                    ident,
                    "only one field may be marked #[column(primary_key)]",
                ));
            }
        }

        let mut modifiers = Vec::new();
        if let Some(name) = &attrs.name {
            modifiers.push(quote! { .column(#name) });
        }
        if let Some(sql_type) = &attrs.sql_type {
            modifiers.push(quote! { .sql_type(#sql_type) });
        }
        if attrs.primary_key {
            modifiers.push(quote! { .primary_key() });
        }
        if attrs.ignore {
            modifiers.push(quote! { .ignore() });
        }

        field_defs.push(quote! {
            ::tablesync::entity::FieldDef::new(
                #field_name,
                ::tablesync::mapping::ScalarType::from_rust_type(#rust_type_str),
            )
            #(#modifiers)*
        });
    }

    let expanded = quote! {
        impl ::tablesync::entity::Entity for #struct_name {
            fn entity_def() -> ::tablesync::entity::EntityDef {
                ::tablesync::entity::EntityDef::new(#entity_name)
                    #table_call
                    #(.field(#field_defs))*
            }
        }

        ::tablesync::inventory::submit! {
            ::tablesync::entity::EntityRegistration::of::<#struct_name>(#entity_name)
        }
    };

    Ok(expanded)
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    sql_type: Option<String>,
    primary_key: bool,
    ignore: bool,
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    match value {
        Expr::Lit(syn::ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn get_table_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table_name = Some(string_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unknown entity attribute, expected `table`"))
                }
            })?;
        }
    }
    Ok(table_name)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("column") {
            // Handle empty attribute like #[column]
            if matches!(attr.meta, Meta::Path(_)) {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary_key") {
                    result.primary_key = true;
                } else if meta.path.is_ident("ignore") {
                    result.ignore = true;
                } else if meta.path.is_ident("name") {
                    result.name = Some(string_value(&meta)?);
                } else if meta.path.is_ident("sql_type") {
                    result.sql_type = Some(string_value(&meta)?);
                } else {
                    return Err(meta.error(
                        "unknown column attribute, expected one of `primary_key`, `ignore`, `name`, `sql_type`",
                    ));
                }
                Ok(())
            })?;
        }
    }

    Ok(result)
}
