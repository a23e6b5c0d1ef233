use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A hypermedia link as it appears under a resource's `_links` object.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Link {
    pub href: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionLinks {
    #[serde(rename = "osdi:person")]
    pub person: Option<Link>,
    #[serde(rename = "self")]
    pub own: Option<Link>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionEmbedded {
    /// Present when the collection was fetched with `expand=person`.
    #[serde(rename = "osdi:person")]
    pub person: Option<Person>,
}

/// One form response as it appears in the submissions collection.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionSummary {
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub custom_fields: IndexMap<String, Value>,
    #[serde(rename = "_links", default)]
    pub links: SubmissionLinks,
    #[serde(rename = "_embedded", default)]
    pub embedded: SubmissionEmbedded,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct EmailAddress {
    #[serde(default)]
    pub address: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PostalAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PersonLinks {
    #[serde(rename = "osdi:taggings")]
    pub taggings: Option<Link>,
}

/// A supporter profile as returned by the upstream people resource.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub postal_addresses: Vec<PostalAddress>,
    #[serde(default)]
    pub custom_fields: IndexMap<String, Value>,
    /// Tag names embedded directly on the person payload. When absent the
    /// taggings sub-resource has to be walked instead.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "_links", default)]
    pub links: PersonLinks,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TaggingEmbedded {
    #[serde(rename = "osdi:tag")]
    pub tag: Option<Tag>,
}

/// Join record linking a person to a tag. The tag itself may be embedded
/// or missing entirely, in which case the entry resolves to no tag name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Tagging {
    #[serde(rename = "_embedded", default)]
    pub embedded: TaggingEmbedded,
}

/// The record this service ultimately produces and serves: the person
/// profile with the owning submission's custom fields overlaid and the
/// person's tags resolved to plain names.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct MergedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub postal_addresses: Vec<PostalAddress>,
    #[serde(default)]
    pub custom_fields: IndexMap<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MergedRecord {
    pub const ANONYMOUS: &'static str = "Anonymous";

    /// Full display name, falling back to [`Self::ANONYMOUS`] when the
    /// profile carries no name parts at all.
    pub fn display_name(&self) -> String {
        let name = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if name.is_empty() {
            Self::ANONYMOUS.to_string()
        } else {
            name
        }
    }

    /// "Locality, Region" drawn from the first postal address. Empty when
    /// no address information is known.
    pub fn location(&self) -> String {
        let Some(address) = self.postal_addresses.first() else {
            return String::new();
        };

        [address.locality.as_deref(), address.region.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|email| email.address.as_str())
    }

    /// String value of a custom field, if the field is set to a string.
    pub fn custom_field(&self, key: &str) -> Option<&str> {
        self.custom_fields.get(key).and_then(Value::as_str)
    }
}
