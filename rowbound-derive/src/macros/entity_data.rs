//! Derive macro for EntityData
//!
//! Generates the `EntityData` implementation plus one getter/setter pair per
//! declared column and one accessor per declared relation.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DeriveInput, Fields, FieldsNamed};

use crate::attributes::{self, ColumnSpec, RelationSpec};

pub fn derive_entity_data(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn named_fields(input: &DeriveInput) -> syn::Result<&FieldsNamed> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                "EntityData requires a struct with named fields",
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            "EntityData can only be derived for structs",
        )),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let fields = named_fields(input)?;

    // `#[orm]` wins; otherwise a field called `orm`
    let orm_field = fields
        .named
        .iter()
        .find(|field| attributes::has_attribute(field, "orm"))
        .or_else(|| {
            fields
                .named
                .iter()
                .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "orm"))
        })
        .and_then(|field| field.ident.clone())
        .ok_or_else(|| {
            syn::Error::new_spanned(
                struct_name,
                "EntityData needs a DataMapper field marked #[orm]",
            )
        })?;
    let other_fields: Vec<_> = fields
        .named
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .filter(|ident| **ident != orm_field)
        .collect();

    let columns = attributes::extract_columns(&input.attrs)?;
    let relations = attributes::extract_relations(&input.attrs)?;
    let column_names = columns.iter().map(ColumnSpec::column);
    let column_accessors = columns.iter().map(column_accessors);
    let relation_accessors = relations.iter().map(relation_accessor);

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::rowbound::EntityData for #struct_name #ty_generics #where_clause {
            fn from_data_mapper(orm: ::rowbound::DataMapper) -> Self {
                Self {
                    #orm_field: orm,
                    #(#other_fields: ::core::default::Default::default(),)*
                }
            }

            fn orm(&self) -> &::rowbound::DataMapper {
                &self.#orm_field
            }

            fn orm_mut(&mut self) -> &mut ::rowbound::DataMapper {
                &mut self.#orm_field
            }

            fn declared_columns() -> &'static [&'static str] {
                &[#(#column_names),*]
            }
        }

        impl #impl_generics #struct_name #ty_generics #where_clause {
            #(#column_accessors)*
            #(#relation_accessors)*
        }
    })
}

fn column_accessors(spec: &ColumnSpec) -> TokenStream2 {
    let getter = &spec.name;
    let setter = format_ident!("set_{}", spec.name.unraw());
    let column = spec.column();
    let ty = &spec.ty;
    let get_doc = format!("Value of column `{column}`");
    let set_doc = format!("Assign column `{column}` and mark it dirty");

    quote! {
        #[doc = #get_doc]
        pub fn #getter(&self) -> ::core::result::Result<#ty, ::rowbound::OrmError> {
            ::rowbound::EntityData::orm(self).get::<#ty>(#column)
        }

        #[doc = #set_doc]
        pub fn #setter(&mut self, value: #ty) -> ::core::result::Result<(), ::rowbound::OrmError> {
            ::rowbound::EntityData::orm_mut(self).set_column(#column, value)
        }
    }
}

fn relation_accessor(spec: &RelationSpec) -> TokenStream2 {
    let accessor = &spec.name;
    let relation = spec.relation();
    let ty = &spec.ty;
    let doc = format!("Entities of relation `{relation}`, loaded on first access");

    if spec.many {
        quote! {
            #[doc = #doc]
            pub fn #accessor(&self) -> ::core::result::Result<::std::vec::Vec<#ty>, ::rowbound::OrmError> {
                ::rowbound::EntityData::orm(self).related_many::<#ty>(#relation)
            }
        }
    } else {
        quote! {
            #[doc = #doc]
            pub fn #accessor(&self) -> ::core::result::Result<::core::option::Option<#ty>, ::rowbound::OrmError> {
                ::rowbound::EntityData::orm(self).related_one::<#ty>(#relation)
            }
        }
    }
}
