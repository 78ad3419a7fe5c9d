use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    DeriveInput, Generics, Ident, LitStr,
    parse::{Parse, ParseStream},
};

#[derive(Debug)]
pub struct DeriveEvent {
    ident: Ident,
    generics: Generics,
    event_type: LitStr,
}

impl DeriveEvent {
    pub fn expand(self) -> TokenStream {
        let Self {
            ident,
            generics,
            event_type,
        } = self;
        let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

        quote! {
            #[automatically_derived]
            impl #impl_generics ::idpstore_eventstore::event::Event for #ident #ty_generics #where_clause {
                const EVENT_TYPE: &'static str = #event_type;
            }
        }
    }
}

impl Parse for DeriveEvent {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let input: DeriveInput = input.parse()?;

        // Tags are persisted, never derived from the struct name.
        let event_type = input
            .attrs
            .iter()
            .find_map(|attr| {
                if attr.path().is_ident("event_type") {
                    Some(attr.parse_args::<LitStr>())
                } else {
                    None
                }
            })
            .transpose()?
            .ok_or_else(|| {
                syn::Error::new(
                    input.ident.span(),
                    "Event requires an #[event_type(\"...\")] attribute",
                )
            })?;

        if event_type.value().is_empty() {
            return Err(syn::Error::new(
                event_type.span(),
                "event type cannot be empty",
            ));
        }

        Ok(DeriveEvent {
            ident: input.ident,
            generics: input.generics,
            event_type,
        })
    }
}
