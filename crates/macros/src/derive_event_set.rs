use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    DeriveInput, Ident, Type,
    parse::{Parse, ParseStream},
    spanned::Spanned,
};

#[derive(Debug)]
pub struct DeriveEventSet {
    ident: Ident,
    events: Vec<(Ident, Type)>,
}

impl DeriveEventSet {
    pub fn expand(self) -> TokenStream {
        let Self { ident, events } = self;

        let event_types = events.iter().map(|(_, ty)| ty);

        let match_arms = events.iter().map(|(variant_ident, ty)| {
            quote! {
                <#ty as ::idpstore_eventstore::event::Event>::EVENT_TYPE => {
                    ::std::option::Option::Some(
                        ::idpstore_eventstore::__private::serde_json::from_value::<#ty>(data)
                            .map(#ident::#variant_ident)
                            .map_err(::idpstore_eventstore::error::SerializationError::from)
                    )
                }
            }
        });

        quote! {
            #[automatically_derived]
            impl ::idpstore_eventstore::event::EventSet for #ident {
                const EVENT_TYPES: &'static [&'static str] = &[ #( <#event_types as ::idpstore_eventstore::event::Event>::EVENT_TYPE, )* ];

                fn from_event(event_type: &str, data: ::idpstore_eventstore::__private::serde_json::Value) -> ::std::option::Option<::std::result::Result<Self, ::idpstore_eventstore::error::SerializationError>> {
                    match event_type {
                        #( #match_arms )*
                        _ => ::std::option::Option::None
                    }
                }
            }
        }
    }
}

impl Parse for DeriveEventSet {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let input: DeriveInput = input.parse()?;
        let input_span = input.ident.span();

        let events = match input.data {
            syn::Data::Enum(data) => data
                .variants
                .into_iter()
                .map(|variant| {
                    let span = variant.fields.span();
                    match variant.fields {
                        syn::Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                            let field = unnamed.unnamed.into_iter().next().ok_or_else(|| {
                                syn::Error::new(span, "expected exactly one unnamed field")
                            })?;
                            Ok((variant.ident, field.ty))
                        }
                        _ => Err(syn::Error::new(
                            span,
                            "EventSet requires one unnamed field per event type",
                        )),
                    }
                })
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(syn::Error::new(
                    input_span,
                    "EventSet can only be derived on enums",
                ));
            }
        };

        Ok(DeriveEventSet {
            ident: input.ident,
            events,
        })
    }
}
