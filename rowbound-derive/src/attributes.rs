//! Attribute parsing utilities

use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, Field, Ident, Token, Type};

/// One `name: Type` entry of `#[columns(...)]`
pub struct ColumnSpec {
    pub name: Ident,
    pub ty: Type,
}

impl Parse for ColumnSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name = Ident::parse_any(input)?;
        input.parse::<Token![:]>()?;
        let ty = input.parse()?;
        Ok(Self { name, ty })
    }
}

impl ColumnSpec {
    /// Column name as stored in the database
    pub fn column(&self) -> String {
        self.name.unraw().to_string()
    }
}

/// One `name: Type` or `name: [Type]` entry of `#[relations(...)]`
pub struct RelationSpec {
    pub name: Ident,
    pub ty: Type,
    pub many: bool,
}

impl Parse for RelationSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name = Ident::parse_any(input)?;
        input.parse::<Token![:]>()?;
        match input.parse::<Type>()? {
            Type::Slice(slice) => Ok(Self {
                name,
                ty: *slice.elem,
                many: true,
            }),
            ty => Ok(Self {
                name,
                ty,
                many: false,
            }),
        }
    }
}

impl RelationSpec {
    pub fn relation(&self) -> String {
        self.name.unraw().to_string()
    }
}

fn parse_list<T: Parse>(attrs: &[Attribute], name: &str) -> syn::Result<Vec<T>> {
    let mut specs = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(name)) {
        let list = attr.parse_args_with(Punctuated::<T, Token![,]>::parse_terminated)?;
        specs.extend(list);
    }
    Ok(specs)
}

/// Extract `#[columns(...)]` entries from struct attributes
pub fn extract_columns(attrs: &[Attribute]) -> syn::Result<Vec<ColumnSpec>> {
    parse_list(attrs, "columns")
}

/// Extract `#[relations(...)]` entries from struct attributes
pub fn extract_relations(attrs: &[Attribute]) -> syn::Result<Vec<RelationSpec>> {
    parse_list(attrs, "relations")
}

/// Check if field has a specific attribute
pub fn has_attribute(field: &Field, attr_name: &str) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident(attr_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_extract_columns() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[columns(id: i64, r#type: String)]),
            parse_quote!(#[columns(body: Option<String>,)]),
            parse_quote!(#[doc = "ignored"]),
        ];
        let columns = extract_columns(&attrs).unwrap();
        let names: Vec<String> = columns.iter().map(ColumnSpec::column).collect();
        assert_eq!(names, vec!["id", "type", "body"]);
        assert_eq!(columns[0].ty, parse_quote!(i64));
        assert_eq!(columns[2].ty, parse_quote!(Option<String>));
    }

    #[test]
    fn test_extract_relations() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[relations(user: User, tags: [crate::Tag])])];
        let relations = extract_relations(&attrs).unwrap();
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].relation(), "user");
        assert!(!relations[0].many);
        assert_eq!(relations[1].relation(), "tags");
        assert!(relations[1].many);
        assert_eq!(relations[1].ty, parse_quote!(crate::Tag));
    }

    #[test]
    fn test_malformed_columns() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[columns(id i64)])];
        assert!(extract_columns(&attrs).is_err());
    }

    #[test]
    fn test_has_attribute() {
        let field: Field = parse_quote!(#[orm] orm: DataMapper);
        assert!(has_attribute(&field, "orm"));
        assert!(!has_attribute(&field, "columns"));
    }
}
