use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Type,
};

/// Set up a fresh file-backed app for a test, inject dependencies, and ensure
/// that the store file is deleted regardless of how the test terminates.
///
/// Injectable dependencies are `App`, `Config`, `Store`, `CredentialStore`,
/// `AuthSequencer`, `ElectionEngine`, `Session` and `Coll<T>`. Pass `admin` or
/// `voter` to have the injected `Session` logged in.
#[proc_macro_attribute]
pub fn engine_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut test_fn = parse_macro_input!(input as ItemFn);
    let session_kind = parse_macro_input!(args as Option<Ident>);

    let session = match session_setup(session_kind) {
        Ok(tokens) => tokens,
        Err(err) => return err.into_compile_error().into(),
    };
    let injected = match injections(&test_fn) {
        Ok(injected) => injected,
        Err(err) => return err.into_compile_error().into(),
    };

    // The body keeps the user's signature under a new name; the outer
    // function takes over the original name and the #[test] attribute.
    let test_name = test_fn.sig.ident.clone();
    let body_name = format_ident!("{}_body", test_name);
    test_fn.sig.ident = body_name.clone();

    quote! {
        #[test]
        fn #test_name() {
            #test_fn

            let app = crate::testing::app();
            let store_path = app.store().path();
            let session = #session;

            // `App` and `Session` are not `UnwindSafe`; hand them over through
            // mutexes, which are.
            let app_slot = std::sync::Mutex::new(app);
            let session_slot = std::sync::Mutex::new(session);
            let outcome = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let app = app_slot.into_inner().unwrap();
                #[allow(unused_variables)]
                let session = session_slot.into_inner().unwrap();
                #body_name(#(#injected),*);
            });

            crate::testing::cleanup(store_path.as_deref());
            if let Err(panic) = outcome {
                std::panic::resume_unwind(panic);
            }
        }
    }
    .into()
}

/// The expression that builds the injected `Session`.
fn session_setup(kind: Option<Ident>) -> syn::Result<TokenStream2> {
    let Some(kind) = kind else {
        return Ok(quote! { crate::model::session::Session::new() });
    };
    match kind.to_string().as_str() {
        "admin" => Ok(quote! {
            crate::testing::admin_session(app.auth(), app.config())
        }),
        "voter" => Ok(quote! {
            crate::testing::voter_session(app.credentials(), app.auth())
        }),
        _ => Err(syn::Error::new(kind.span(), "Expected `admin` or `voter`")),
    }
}

/// One expression per test parameter, in order.
fn injections(test_fn: &ItemFn) -> syn::Result<Vec<TokenStream2>> {
    if let Some(asyncness) = test_fn.sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "Test must not be marked `async`; the engine is synchronous",
        ));
    }

    let mut services_seen: Vec<String> = vec![];
    let mut injected = vec![];
    for param in &test_fn.sig.inputs {
        let FnArg::Typed(typed) = param else {
            return Err(unsupported(param.span()));
        };
        if !matches!(&*typed.pat, Pat::Ident(_)) {
            return Err(unsupported(typed.pat.span()));
        }
        if let Some(collection) = collection_type(&typed.ty) {
            injected.push(quote! {
                crate::model::store::Coll::<#collection>::from_store(app.store())
            });
            continue;
        }
        let Some((service, expr)) = service(&typed.ty) else {
            return Err(unsupported(typed.ty.span()));
        };
        if services_seen.contains(&service) {
            return Err(syn::Error::new(
                param.span(),
                format!("Test cannot accept more than one `{service}`"),
            ));
        }
        services_seen.push(service);
        injected.push(expr);
    }
    Ok(injected)
}

/// A bare service type name and how to obtain one from `app`.
fn service(ty: &Type) -> Option<(String, TokenStream2)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let name = path.path.get_ident()?.to_string();
    let expr = match name.as_str() {
        "App" => quote! { app.clone() },
        "Config" => quote! { app.config().clone() },
        "Store" => quote! { app.store().clone() },
        "CredentialStore" => quote! { app.credentials().clone() },
        "AuthSequencer" => quote! { app.auth().clone() },
        "ElectionEngine" => quote! { app.engine().clone() },
        "Session" => quote! { session.clone() },
        _ => return None,
    };
    Some((name, expr))
}

/// `T` for a parameter typed `Coll<T>` (under any path).
fn collection_type(ty: &Type) -> Option<&Ident> {
    let Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != "Coll" {
        return None;
    }
    let PathArguments::AngleBracketed(generics) = &last.arguments else {
        return None;
    };
    match generics.args.first()? {
        GenericArgument::Type(Type::Path(inner)) => inner.path.get_ident(),
        _ => None,
    }
}

fn unsupported(span: Span) -> syn::Error {
    syn::Error::new(
        span,
        "Expected an injectable type (`App`, `Config`, `Store`, `CredentialStore`, \
         `AuthSequencer`, `ElectionEngine`, `Session`) or `Coll<T>`",
    )
}
