//! Procedural macros for `twirpox` service definitions.
//!
//! # Example
//!
//! ```ignore
//! twirpox::service! {
//!     package example.haberdasher;
//!
//!     service Haberdasher {
//!         rpc MakeHat(Size) returns (Hat);
//!     }
//! }
//!
//! // Generated:
//! // - `trait Haberdasher` with `async fn make_hat(&self, ctx: Context, request: Size) -> Result<Hat>`
//! // - `HABERDASHER_SERVICE_ID` and `HABERDASHER_METHODS`
//! // - `haberdasher_router(service)` and `haberdasher_server(service)`
//! // - `HaberdasherJsonClient<T>` and `HaberdasherProtobufClient<T>`
//! ```
//!
//! The generated code refers to everything through the `twirpox` crate, so that is the crate
//! users must depend on.
#![deny(unsafe_code)]

use heck::{ToShoutySnakeCase, ToSnakeCase};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

mod parser;

use parser::{MethodDef, ServiceDef, ServiceFile};

/// Define one or more services from a protobuf-like descriptor.
///
/// See the crate documentation for the descriptor syntax and the generated items.  Streaming
/// methods are rejected at compile time.
#[proc_macro]
pub fn service(input: TokenStream) -> TokenStream {
    let file = syn::parse_macro_input!(input as ServiceFile);

    generate(&file).into()
}

fn generate(file: &ServiceFile) -> TokenStream2 {
    let services = file.services.iter().map(|service| generate_service(file, service));

    quote! { #(#services)* }
}

fn generate_service(file: &ServiceFile, service: &ServiceDef) -> TokenStream2 {
    let service_id = file.service_id(service);
    let trait_name = &service.name;
    let attrs = &service.attrs;

    let snake = service.name.to_string().to_snake_case();
    let shouty = service.name.to_string().to_shouty_snake_case();
    let service_id_const = format_ident!("{}_SERVICE_ID", shouty);
    let methods_const = format_ident!("{}_METHODS", shouty);
    let router_fn = format_ident!("{}_router", snake);
    let server_fn = format_ident!("{}_server", snake);
    let server_with_config_fn = format_ident!("{}_server_with_config", snake);

    let method_names = service.methods.iter().map(|m| m.name.to_string());
    let trait_methods = service.methods.iter().map(generate_trait_method);
    let registrations = service.methods.iter().map(|method| {
        let name = method.name.to_string();
        let fn_name = method.fn_name();
        let input = &method.input;

        quote! {
            router.register_method(
                #name,
                |service: ::std::sync::Arc<TwirpService>, ctx: ::twirpox::Context, request: #input| async move {
                    service.#fn_name(ctx, request).await
                },
            );
        }
    });

    let json_client = generate_client(service, &service_id_const, "Json", quote! { ::twirpox::ContentType::Json });
    let protobuf_client = generate_client(
        service,
        &service_id_const,
        "Protobuf",
        quote! { ::twirpox::ContentType::Protobuf },
    );

    let router_doc = format!("Route all methods of `{service_id}` to `service`.");
    let server_doc = format!("Serve `{service_id}` with `service`, under the default prefix.");

    quote! {
        #(#attrs)*
        #[::twirpox::async_trait]
        pub trait #trait_name: Send + Sync + 'static {
            #(#trait_methods)*
        }

        #[doc = concat!("Fully-qualified name of the `", stringify!(#trait_name), "` service.")]
        pub const #service_id_const: &str = #service_id;

        #[doc = concat!("Names of the methods of the `", stringify!(#trait_name), "` service.")]
        pub const #methods_const: &[&str] = &[#(#method_names),*];

        #[doc = #router_doc]
        pub fn #router_fn<TwirpService: #trait_name>(
            service: TwirpService,
        ) -> ::twirpox::Router<::std::sync::Arc<TwirpService>> {
            #[allow(unused_mut)]
            let mut router = ::twirpox::Router::new_with_state(::std::sync::Arc::new(service));
            #(#registrations)*
            router
        }

        #[doc = #server_doc]
        pub fn #server_fn<TwirpService: #trait_name>(
            service: TwirpService,
        ) -> ::twirpox::Server<::std::sync::Arc<TwirpService>> {
            #server_with_config_fn(service, ::twirpox::ServerConfig::default())
        }

        #[doc = #server_doc]
        pub fn #server_with_config_fn<TwirpService: #trait_name>(
            service: TwirpService,
            config: ::twirpox::ServerConfig,
        ) -> ::twirpox::Server<::std::sync::Arc<TwirpService>> {
            ::twirpox::Server::builder(#service_id_const)
                .with_config(config)
                .with_router(#router_fn(service))
                .build()
        }

        #json_client
        #protobuf_client
    }
}

fn generate_trait_method(method: &MethodDef) -> TokenStream2 {
    let attrs = &method.attrs;
    let fn_name = method.fn_name();
    let input = &method.input;
    let output = &method.output;

    quote! {
        #(#attrs)*
        async fn #fn_name(
            &self,
            ctx: ::twirpox::Context,
            request: #input,
        ) -> ::twirpox::Result<#output>;
    }
}

/// A client bound to one content type.  `flavor` is `Json` or `Protobuf`.
fn generate_client(
    service: &ServiceDef,
    service_id_const: &syn::Ident,
    flavor: &str,
    content_type: TokenStream2,
) -> TokenStream2 {
    let client_name = format_ident!("{}{}Client", service.name, flavor);
    let struct_doc = format!(
        "Client for the `{}` service that encodes requests as {}.",
        service.name,
        flavor.to_lowercase()
    );

    let methods = service.methods.iter().map(|method| {
        let name = method.name.to_string();
        let fn_name = method.fn_name();
        let with_context_fn = format_ident!("{}_with_context", fn_name);
        let input = &method.input;
        let output = &method.output;
        let attrs = &method.attrs;
        let with_context_doc = format!(
            "Like [`Self::{fn_name}`], sending the request metadata attached to `ctx` and \
             attaching the response metadata to it."
        );

        quote! {
            #(#attrs)*
            pub async fn #fn_name(&self, request: &#input) -> ::twirpox::Result<#output> {
                self.#with_context_fn(&::twirpox::Context::new(), request).await
            }

            #[doc = #with_context_doc]
            pub async fn #with_context_fn(
                &self,
                ctx: &::twirpox::Context,
                request: &#input,
            ) -> ::twirpox::Result<#output> {
                self.client.call(ctx, #content_type, #name, request).await
            }
        }
    });

    quote! {
        #[doc = #struct_doc]
        pub struct #client_name<TwirpTransport: ::twirpox::HttpTransport> {
            client: ::twirpox::Client<TwirpTransport>,
        }

        impl<TwirpTransport: ::twirpox::HttpTransport> ::std::clone::Clone for #client_name<TwirpTransport> {
            fn clone(&self) -> Self {
                Self {
                    client: self.client.clone(),
                }
            }
        }

        impl<TwirpTransport: ::twirpox::HttpTransport> #client_name<TwirpTransport> {
            pub fn new(transport: TwirpTransport) -> Self {
                Self::with_config(transport, ::twirpox::ClientConfig::default())
            }

            pub fn with_config(transport: TwirpTransport, config: ::twirpox::ClientConfig) -> Self {
                Self {
                    client: ::twirpox::ClientBuilder::new(#service_id_const)
                        .with_config(config)
                        .bind(transport),
                }
            }

            /// The underlying client, for calls by method name.
            pub fn client(&self) -> &::twirpox::Client<TwirpTransport> {
                &self.client
            }

            #(#methods)*
        }
    }
}
