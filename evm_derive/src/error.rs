//! `#[derive(Error)]` for error enums.
//!
//! ```ignore
//! use evm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum VMError {
//!     #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
//!     InvalidOpcode { opcode: u8, offset: usize },
//!
//!     #[error("invalid hex literal: {0}")]
//!     InvalidHex(String),
//!
//!     #[error("halted")]
//!     Halted,
//! }
//! ```
//!
//! Messages are ordinary `format!` strings. Tuple fields are referenced
//! positionally (`{0}`), struct fields by name (`{opcode}`), and any format
//! spec after the name (`{opcode:02x}`) is passed through untouched.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Variant, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "#[derive(Error)] is only supported on enums",
        ));
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let arms = data
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds the `match` arm that formats a single variant.
fn display_arm(variant: &Variant) -> syn::Result<TokenStream2> {
    let ident = &variant.ident;
    let message = error_message(variant)?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => write!(f, #message),
        },
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().filter_map(|f| f.ident.clone()).collect();
            let used = used_arguments(&message, &names);
            quote! {
                #[allow(unused_variables)]
                Self::#ident { #(#names),* } => write!(f, #message, #(#used = #used),*),
            }
        }
        Fields::Unnamed(fields) => {
            let count = fields.unnamed.len();
            let bindings: Vec<_> = (0..count).map(|i| format_ident!("_{}", i)).collect();
            let message = rename_positional(&message, count);
            let used = used_arguments(&message, &bindings);
            quote! {
                #[allow(unused_variables)]
                Self::#ident(#(#bindings),*) => write!(f, #message, #(#used = #used),*),
            }
        }
    })
}

/// Reads the string literal out of `#[error("...")]`.
fn error_message(variant: &Variant) -> syn::Result<String> {
    let attr = variant
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &variant.ident,
                format!(
                    "variant `{}` is missing #[error(\"...\")]",
                    variant.ident
                ),
            )
        })?;

    attr.parse_args::<LitStr>()
        .map(|lit| lit.value())
        .map_err(|_| {
            syn::Error::new_spanned(
                attr,
                "expected a string literal, e.g. #[error(\"stack underflow\")]",
            )
        })
}

/// Rewrites `{0}` / `{0:x}` into `{_0}` / `{_0:x}` so tuple fields can be
/// passed as named arguments.
fn rename_positional(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{_{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{_{i}:"));
    }
    out
}

/// Returns the bindings that the message actually interpolates.
///
/// `write!` rejects named arguments that the format string never uses, so
/// fields left out of a message must not be passed.
fn used_arguments(message: &str, bindings: &[Ident]) -> Vec<Ident> {
    let mut referenced = Vec::new();
    let mut rest = message;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        if let Some(escaped) = rest.strip_prefix('{') {
            rest = escaped;
            continue;
        }
        let end = rest.find(['}', ':']).unwrap_or(rest.len());
        referenced.push(rest[..end].trim().to_string());
        rest = &rest[end..];
    }

    bindings
        .iter()
        .filter(|ident| referenced.iter().any(|name| *ident == name))
        .cloned()
        .collect()
}
