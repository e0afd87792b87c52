//! Test attributes that fail a test instead of letting it hang.
//!
//! `#[tokio_timeout_test]` runs an async body on a fresh Tokio runtime and
//! `#[timeout]` runs a synchronous body. Both accept an optional limit in
//! seconds (default 60); the async form also accepts `multi_thread` to run
//! on a multi-threaded runtime, e.g. `#[tokio_timeout_test(15, multi_thread)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
    Attribute, Ident, ItemFn, LitInt, Token,
};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flavor {
    CurrentThread,
    MultiThread,
}

enum TimeoutArg {
    Secs(LitInt),
    Flavor(Ident),
}

impl Parse for TimeoutArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitInt) {
            input.parse().map(TimeoutArg::Secs)
        } else {
            input.parse().map(TimeoutArg::Flavor)
        }
    }
}

struct TimeoutArgs {
    secs: u64,
    flavor: Flavor,
}

impl Parse for TimeoutArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = TimeoutArgs {
            secs: DEFAULT_TIMEOUT_SECS,
            flavor: Flavor::CurrentThread,
        };
        for arg in Punctuated::<TimeoutArg, Token![,]>::parse_terminated(input)? {
            match arg {
                TimeoutArg::Secs(lit) => {
                    let secs: u64 = lit.base10_parse()?;
                    if secs == 0 {
                        return Err(syn::Error::new_spanned(
                            lit,
                            "timeout must be greater than zero",
                        ));
                    }
                    args.secs = secs;
                }
                TimeoutArg::Flavor(ident) if ident == "multi_thread" => {
                    args.flavor = Flavor::MultiThread;
                }
                TimeoutArg::Flavor(ident) if ident == "current_thread" => {
                    args.flavor = Flavor::CurrentThread;
                }
                TimeoutArg::Flavor(ident) => {
                    return Err(syn::Error::new_spanned(
                        ident,
                        "expected `multi_thread` or `current_thread`",
                    ));
                }
            }
        }
        Ok(args)
    }
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TimeoutArgs);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }
    sig.asyncness = None;

    let builder = match args.flavor {
        Flavor::CurrentThread => quote!(tokio::runtime::Builder::new_current_thread()),
        Flavor::MultiThread => quote!(tokio::runtime::Builder::new_multi_thread()),
    };
    let body = quote! {
        let runtime = #builder
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime");
        runtime.block_on(async {
            tokio::time::timeout(timeout_duration, async move #block)
                .await
                .expect("test timed out");
        });
    };

    let attrs = strip_attrs(attrs, is_tokio_test_attribute);
    let harness = harness(args.secs, body);
    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #harness
        }
    })
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TimeoutArgs);
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout attribute expects a synchronous test function",
        )
        .to_compile_error()
        .into();
    }
    if args.flavor == Flavor::MultiThread {
        return syn::Error::new_spanned(&sig.ident, "runtime flavors apply to async tests only")
            .to_compile_error()
            .into();
    }

    let attrs = strip_attrs(attrs, is_test_attribute);
    let harness = harness(args.secs, quote!(#block));
    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #harness
        }
    })
}

/// Runs `body` on a watchdog-supervised thread and re-raises its outcome.
fn harness(secs: u64, body: TokenStream2) -> TokenStream2 {
    quote! {
        let timeout_duration = std::time::Duration::from_secs(#secs);
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| { #body }));
            let _ = sender.send(result);
        });
        match receiver.recv_timeout(timeout_duration) {
            Ok(Ok(_)) => {}
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => panic!("test timed out"),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                panic!("test thread failed before reporting result")
            }
        }
    }
}

fn strip_attrs(attrs: Vec<Attribute>, drop: fn(&Attribute) -> bool) -> Vec<Attribute> {
    attrs.into_iter().filter(|attr| !drop(attr)).collect()
}

fn is_tokio_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(first), Some(second), None)
            if first.ident == "tokio" && second.ident == "test"
    )
}

fn is_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!((segments.next(), segments.next()), (Some(first), None) if first.ident == "test")
}
