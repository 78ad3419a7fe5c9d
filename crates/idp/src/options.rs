//! Field bundles shared by several provider kinds.
//!
//! Each bundle has a delta type with one optional field per bundle field.
//! Deltas are diffed with `changes`, applied with `reduce_changes`, and
//! only persisted when not `is_zero`.

use serde::{Deserialize, Serialize};

macro_rules! change_bundle {
    (
        $(#[$meta:meta])*
        pub struct $bundle:ident / $changes:ident {
            $( $(#[$field_meta:meta])* $field:ident : $ty:ty, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $bundle {
            $( $(#[$field_meta])* #[serde(default)] pub $field: $ty, )+
        }

        #[doc = concat!("Field-level delta of [`", stringify!($bundle), "`].")]
        #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $changes {
            $(
                $(#[$field_meta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )+
        }

        impl $bundle {
            /// The delta turning `self` into `desired`.
            pub fn changes(&self, desired: &$bundle) -> $changes {
                $changes {
                    $( $field: (self.$field != desired.$field).then(|| desired.$field.clone()), )+
                }
            }

            pub fn reduce_changes(&mut self, changes: &$changes) {
                $(
                    if let Some(value) = &changes.$field {
                        self.$field = value.clone();
                    }
                )+
            }
        }

        impl $changes {
            pub fn is_zero(&self) -> bool {
                true $( && self.$field.is_none() )+
            }
        }

        impl crate::changes::Delta for $changes {
            fn is_zero(&self) -> bool {
                $changes::is_zero(self)
            }
        }
    };
}

change_bundle! {
    /// Account capability flags attached to every provider.
    pub struct Options / OptionChanges {
        is_creation_allowed: bool,
        is_linking_allowed: bool,
        is_auto_creation: bool,
        is_auto_update: bool,
    }
}

change_bundle! {
    /// LDAP directory attributes mapped onto user fields.
    ///
    /// An empty attribute keeps the provider's default mapping.
    pub struct LdapAttributes / LdapAttributeChanges {
        id_attribute: String,
        first_name_attribute: String,
        last_name_attribute: String,
        display_name_attribute: String,
        nick_name_attribute: String,
        preferred_username_attribute: String,
        email_attribute: String,
        email_verified_attribute: String,
        phone_attribute: String,
        phone_verified_attribute: String,
        preferred_language_attribute: String,
        #[serde(rename = "avatarURLAttribute")]
        avatar_url_attribute: String,
        profile_attribute: String,
    }
}

impl LdapAttributes {
    /// The attributes that override a default mapping, by field name.
    pub fn overrides(&self) -> Vec<(&'static str, &str)> {
        [
            ("id", &self.id_attribute),
            ("first_name", &self.first_name_attribute),
            ("last_name", &self.last_name_attribute),
            ("display_name", &self.display_name_attribute),
            ("nick_name", &self.nick_name_attribute),
            ("preferred_username", &self.preferred_username_attribute),
            ("email", &self.email_attribute),
            ("email_verified", &self.email_verified_attribute),
            ("phone", &self.phone_attribute),
            ("phone_verified", &self.phone_verified_attribute),
            ("preferred_language", &self.preferred_language_attribute),
            ("avatar_url", &self.avatar_url_attribute),
            ("profile", &self.profile_attribute),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(field, value)| (field, value.as_str()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identical_options_have_zero_changes() {
        let options = Options {
            is_creation_allowed: true,
            is_auto_update: true,
            ..Default::default()
        };
        assert!(options.changes(&options.clone()).is_zero());
    }

    #[test]
    fn changes_contain_only_differing_fields() {
        let current = Options::default();
        let desired = Options {
            is_linking_allowed: true,
            ..Default::default()
        };

        let changes = current.changes(&desired);
        assert_eq!(
            changes,
            OptionChanges {
                is_linking_allowed: Some(true),
                ..Default::default()
            }
        );
        assert!(!changes.is_zero());
    }

    #[test]
    fn reducing_changes_reaches_desired() {
        let mut current = LdapAttributes {
            id_attribute: "uid".to_string(),
            email_attribute: "mail".to_string(),
            ..Default::default()
        };
        let desired = LdapAttributes {
            id_attribute: "uid".to_string(),
            first_name_attribute: "givenName".to_string(),
            ..Default::default()
        };

        let changes = current.changes(&desired);
        current.reduce_changes(&changes);
        assert_eq!(current, desired);
    }

    #[test]
    fn changes_serialize_without_untouched_fields() {
        let changes = OptionChanges {
            is_auto_creation: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({ "isAutoCreation": false })
        );
    }

    #[test]
    fn avatar_attribute_keeps_wire_name() {
        let attributes = LdapAttributes {
            avatar_url_attribute: "jpegPhoto".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&attributes).unwrap();
        assert_eq!(json["avatarURLAttribute"], "jpegPhoto");
        assert_eq!(attributes.overrides(), [("avatar_url", "jpegPhoto")]);
    }
}
