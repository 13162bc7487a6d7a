//! Parser for the service descriptor language, a small subset of protobuf's:
//!
//! ```text
//! package example.haberdasher;
//!
//! /// Makes hats.
//! service Haberdasher {
//!     /// Makes a hat of the given size.
//!     rpc MakeHat(Size) returns (Hat);
//! }
//! ```
//!
//! Message types are Rust types in scope where the macro is invoked, not protobuf names.
use std::collections::{HashMap, HashSet};

use heck::ToSnakeCase;
use proc_macro2::Span;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, Ident, Token, Type, braced, parenthesized};

mod kw {
    syn::custom_keyword!(package);
    syn::custom_keyword!(service);
    syn::custom_keyword!(rpc);
    syn::custom_keyword!(returns);
    syn::custom_keyword!(stream);
}

/// Everything passed to one invocation of the macro.
pub struct ServiceFile {
    pub package: Option<Package>,
    pub services: Vec<ServiceDef>,
}

pub struct Package {
    /// Dotted name, e.g. `example.haberdasher`.
    pub name: String,
    pub span: Span,
}

pub struct ServiceDef {
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub methods: Vec<MethodDef>,
}

pub struct MethodDef {
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub input: Type,
    pub output: Type,
}

impl ServiceFile {
    /// The fully-qualified name a service is served under, `<package>.<Service>`.
    pub fn service_id(&self, service: &ServiceDef) -> String {
        match &self.package {
            Some(package) => format!("{}.{}", package.name, service.name),
            None => service.name.to_string(),
        }
    }
}

impl Parse for ServiceFile {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut package: Option<Package> = None;
        let mut services: Vec<ServiceDef> = Vec::new();

        while !input.is_empty() {
            let attrs = input.call(Attribute::parse_outer)?;

            let lookahead = input.lookahead1();
            if lookahead.peek(kw::package) {
                let parsed: Package = input.parse()?;
                if package.is_some() || !services.is_empty() || !attrs.is_empty() {
                    return Err(syn::Error::new(
                        parsed.span,
                        "`package` may appear only once, before any `service`",
                    ));
                }
                package = Some(parsed);
            } else if lookahead.peek(kw::service) {
                let service = ServiceDef::parse_with_attrs(input, attrs)?;
                if services.iter().any(|existing| existing.name == service.name) {
                    return Err(syn::Error::new(
                        service.name.span(),
                        format!("duplicate service `{}`", service.name),
                    ));
                }
                services.push(service);
            } else {
                return Err(lookahead.error());
            }
        }

        if services.is_empty() {
            return Err(syn::Error::new(
                Span::call_site(),
                "expected at least one `service` definition",
            ));
        }

        Ok(Self { package, services })
    }
}

impl Parse for Package {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let keyword: kw::package = input.parse()?;
        let segments = Punctuated::<Ident, Token![.]>::parse_separated_nonempty_with(input, Ident::parse_any)?;
        input.parse::<Token![;]>()?;

        Ok(Self {
            name: segments.iter().map(|segment| segment.unraw().to_string()).collect::<Vec<_>>().join("."),
            span: keyword.span,
        })
    }
}

impl ServiceDef {
    fn parse_with_attrs(input: ParseStream, attrs: Vec<Attribute>) -> syn::Result<Self> {
        input.parse::<kw::service>()?;
        let name: Ident = input.parse()?;

        let content;
        braced!(content in input);

        let mut methods: Vec<MethodDef> = Vec::new();
        let mut names = HashSet::new();
        let mut fn_names: HashMap<String, Ident> = HashMap::new();
        while !content.is_empty() {
            let attrs = content.call(Attribute::parse_outer)?;

            let lookahead = content.lookahead1();
            if !lookahead.peek(kw::rpc) {
                return Err(lookahead.error());
            }

            let method = MethodDef::parse_with_attrs(&content, attrs)?;
            if !names.insert(method.name.to_string()) {
                return Err(syn::Error::new(
                    method.name.span(),
                    format!("duplicate method `{}` in service `{name}`", method.name),
                ));
            }
            let fn_name = method.fn_name().to_string();
            if let Some(other) = fn_names.get(&fn_name) {
                return Err(syn::Error::new(
                    method.name.span(),
                    format!(
                        "methods `{other}` and `{}` in service `{name}` both map to the Rust method `{fn_name}`",
                        method.name
                    ),
                ));
            }
            fn_names.insert(fn_name, method.name.clone());
            methods.push(method);
        }

        Ok(Self { attrs, name, methods })
    }
}

impl MethodDef {
    /// Name of the Rust method for this RPC: the snake-cased wire name.
    ///
    /// Names that collide with Rust keywords become raw identifiers (`r#match`), except the few
    /// that can't be raw (`self`, `super`, `crate`), which get a trailing `_`.
    pub fn fn_name(&self) -> Ident {
        let snake = self.name.to_string().to_snake_case();
        let span = self.name.span();

        if matches!(snake.as_str(), "self" | "super" | "crate") {
            Ident::new(&format!("{snake}_"), span)
        } else if syn::parse_str::<Ident>(&snake).is_err() || snake == "gen" {
            // Ident's parser rejects keywords; `gen` is reserved from edition 2024 on
            Ident::new_raw(&snake, span)
        } else {
            Ident::new(&snake, span)
        }
    }

    fn parse_with_attrs(input: ParseStream, attrs: Vec<Attribute>) -> syn::Result<Self> {
        input.parse::<kw::rpc>()?;
        let name: Ident = input.parse()?;

        let input_type = parse_message_type(input, &name)?;
        input.parse::<kw::returns>()?;
        let output_type = parse_message_type(input, &name)?;
        input.parse::<Token![;]>()?;

        Ok(Self {
            attrs,
            name,
            input: input_type,
            output: output_type,
        })
    }
}

/// `( Type )`, rejecting `( stream Type )`.
fn parse_message_type(input: ParseStream, method: &Ident) -> syn::Result<Type> {
    let content;
    parenthesized!(content in input);

    if content.peek(kw::stream) {
        // `stream` followed by a type is the streaming modifier; alone or as the start of a path
        // it's just a type name
        let fork = content.fork();
        let keyword: kw::stream = fork.parse()?;
        if !fork.is_empty() && !fork.peek(Token![::]) {
            return Err(syn::Error::new(
                keyword.span,
                format!("method `{method}` is a streaming method, and streaming is not supported"),
            ));
        }
    }

    content.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> syn::Result<ServiceFile> {
        syn::parse_str(src)
    }

    fn error_of(src: &str) -> String {
        match parse(src) {
            Ok(_) => panic!("expected {src:?} to be rejected"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn parses_package_and_service() {
        let file = parse(
            r#"
            package example.haberdasher;

            /// Makes hats.
            service Haberdasher {
                /// Makes a hat.
                rpc MakeHat(Size) returns (Hat);
                rpc ListHats(crate::messages::Empty) returns (HatList);
            }
            "#,
        )
        .unwrap();

        assert_eq!(file.package.as_ref().unwrap().name, "example.haberdasher");
        assert_eq!(file.services.len(), 1);

        let service = &file.services[0];
        assert_eq!(service.name, "Haberdasher");
        assert_eq!(service.attrs.len(), 1);
        assert_eq!(file.service_id(service), "example.haberdasher.Haberdasher");

        let names = service.methods.iter().map(|m| m.name.to_string()).collect::<Vec<_>>();
        assert_eq!(names, ["MakeHat", "ListHats"]);
        assert_eq!(service.methods[0].attrs.len(), 1);
    }

    #[test]
    fn package_is_optional() {
        let file = parse("service Echo { rpc Echo(Msg) returns (Msg); }").unwrap();
        assert!(file.package.is_none());
        assert_eq!(file.service_id(&file.services[0]), "Echo");
    }

    #[test]
    fn several_services() {
        let file = parse(
            "package a; service One { rpc A(X) returns (Y); } service Two { rpc B(X) returns (Y); }",
        )
        .unwrap();
        assert_eq!(file.services.len(), 2);
        assert_eq!(file.service_id(&file.services[1]), "a.Two");
    }

    #[test]
    fn empty_service_is_allowed() {
        let file = parse("service Nothing {}").unwrap();
        assert!(file.services[0].methods.is_empty());
    }

    #[test]
    fn rejects_streaming() {
        let message = error_of("service S { rpc Watch(stream Req) returns (Resp); }");
        assert!(message.contains("`Watch` is a streaming method"), "{message}");

        let message = error_of("service S { rpc Watch(Req) returns (stream Resp); }");
        assert!(message.contains("`Watch` is a streaming method"), "{message}");
    }

    #[test]
    fn a_type_named_stream_is_not_streaming() {
        assert!(parse("service S { rpc M(stream) returns (stream::Resp); }").is_ok());
    }

    #[test]
    fn rejects_duplicates() {
        let message = error_of("service S { rpc M(A) returns (B); rpc M(C) returns (D); }");
        assert_eq!(message, "duplicate method `M` in service `S`");

        let message = error_of("service S {} service S {}");
        assert_eq!(message, "duplicate service `S`");
    }

    #[test]
    fn rejects_methods_with_the_same_rust_name() {
        let message = error_of("service S { rpc GetFoo(A) returns (B); rpc Get_Foo(C) returns (D); }");
        assert_eq!(
            message,
            "methods `GetFoo` and `Get_Foo` in service `S` both map to the Rust method `get_foo`"
        );
    }

    #[test]
    fn keyword_method_names_get_usable_rust_names() {
        let file: ServiceFile = syn::parse_str(
            "service S { rpc Match(A) returns (B); rpc Type(A) returns (B); rpc Self(A) returns (B); \
             rpc MakeHat(A) returns (B); }",
        )
        .unwrap();
        let names = file.services[0]
            .methods
            .iter()
            .map(|method| method.fn_name().to_string())
            .collect::<Vec<_>>();

        assert_eq!(names, ["r#match", "r#type", "super_", "make_hat"]);
    }

    #[test]
    fn rejects_unknown_keywords() {
        let message = error_of("option go_package = \"x\"; service S {}");
        assert!(message.contains("expected `package` or `service`"), "{message}");

        let message = error_of("service S { message Foo {} }");
        assert!(message.contains("expected `rpc`"), "{message}");
    }

    #[test]
    fn rejects_misplaced_package() {
        let message = error_of("service S {} package late;");
        assert!(message.contains("`package` may appear only once"), "{message}");
    }

    #[test]
    fn requires_a_service() {
        assert_eq!(error_of("package lonely;"), "expected at least one `service` definition");
    }
}
