//! Plex payload types and their XML mappings

use std::collections::HashSet;

use serde::Serialize;

use super::xml::XmlNode;
use super::{PlexError, PlexResult};

/// The account that owns a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexAccount {
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl PlexAccount {
    pub fn from_xml(doc: &XmlNode) -> PlexResult<Self> {
        let root = doc
            .root()
            .ok_or_else(|| PlexError::Xml("empty account document".to_string()))?;
        let id = root
            .attr("id")
            .ok_or_else(|| PlexError::Xml("account without id".to_string()))?;

        Ok(Self {
            id: id.to_string(),
            email: root.attr("email").map(str::to_string),
            username: root.attr_any(&["username", "title"]).map(str::to_string),
        })
    }
}

/// A user entry from `/api/users` or `/api/home/users`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexUser {
    pub id: String,
    pub username: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub thumb: Option<String>,
}

impl PlexUser {
    pub fn list_from_xml(doc: &XmlNode) -> Vec<Self> {
        doc.descendants("User")
            .into_iter()
            .filter_map(|node| {
                Some(Self {
                    id: node.attr("id")?.to_string(),
                    username: node.attr("username").map(str::to_string),
                    title: node.attr("title").map(str::to_string),
                    email: node.attr("email").map(str::to_string),
                    thumb: node.attr("thumb").map(str::to_string),
                })
            })
            .collect()
    }

    /// Username, falling back to the display title
    pub fn display_name(&self) -> Option<&str> {
        self.username.as_deref().or(self.title.as_deref())
    }
}

/// Identifiers of every friend of the account, for membership checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendDirectory {
    ids: HashSet<String>,
    emails: HashSet<String>,
    usernames: HashSet<String>,
}

impl FriendDirectory {
    pub fn from_xml(doc: &XmlNode) -> Self {
        let mut directory = Self::default();
        for node in doc
            .descendants("User")
            .into_iter()
            .chain(doc.descendants("Friend"))
        {
            directory.insert(
                node.attr_any(&["id", "userID", "user_id"]),
                node.attr("email"),
                node.attr_any(&["username", "title"]),
            );
        }
        directory
    }

    pub fn insert(&mut self, id: Option<&str>, email: Option<&str>, username: Option<&str>) {
        if let Some(id) = id {
            self.ids.insert(id.trim().to_string());
        }
        if let Some(email) = email {
            self.emails.insert(email.trim().to_lowercase());
        }
        if let Some(username) = username {
            self.usernames.insert(username.trim().to_lowercase());
        }
    }

    /// Match by plex id, then lower-cased email, then lower-cased username
    pub fn contains(&self, plex_id: Option<&str>, email: Option<&str>, username: Option<&str>) -> bool {
        let hit = |value: Option<&str>, set: &HashSet<String>, lower: bool| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| {
                    if lower {
                        set.contains(&v.to_lowercase())
                    } else {
                        set.contains(v)
                    }
                })
                .unwrap_or(false)
        };

        hit(plex_id, &self.ids, false)
            || hit(email, &self.emails, true)
            || hit(username, &self.usernames, true)
    }

    pub fn len(&self) -> usize {
        self.ids.len().max(self.emails.len()).max(self.usernames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexConnection {
    pub uri: String,
    pub local: bool,
}

/// A device from `/api/resources`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexResource {
    pub name: String,
    pub client_identifier: String,
    pub access_token: Option<String>,
    pub provides: String,
    pub connections: Vec<PlexConnection>,
}

impl PlexResource {
    pub fn list_from_xml(doc: &XmlNode) -> Vec<Self> {
        doc.descendants("Device")
            .into_iter()
            .filter_map(|node| {
                Some(Self {
                    name: node.attr("name").unwrap_or_default().to_string(),
                    client_identifier: node.attr("clientIdentifier")?.to_string(),
                    access_token: node.attr("accessToken").map(str::to_string),
                    provides: node.attr("provides").unwrap_or_default().to_string(),
                    connections: node
                        .children_named("Connection")
                        .filter_map(|c| {
                            Some(PlexConnection {
                                uri: c.attr("uri")?.to_string(),
                                local: c.attr("local") == Some("1"),
                            })
                        })
                        .collect(),
                })
            })
            .collect()
    }

    pub fn is_server(&self) -> bool {
        self.provides.split(',').any(|p| p.trim() == "server")
    }

    pub fn local_uri(&self) -> Option<&str> {
        self.connections.iter().find(|c| c.local).map(|c| c.uri.as_str())
    }

    pub fn public_uri(&self) -> Option<&str> {
        self.connections.iter().find(|c| !c.local).map(|c| c.uri.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedSection {
    /// Plex.tv section id
    pub id: Option<i64>,
    /// Section key on the media server
    pub key: Option<i64>,
    pub title: String,
    pub shared: bool,
}

/// A grant linking one friend to one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedServer {
    pub id: String,
    pub user_id: String,
    pub machine_identifier: Option<String>,
    pub sections: Vec<SharedSection>,
}

impl SharedServer {
    pub fn list_from_xml(doc: &XmlNode) -> Vec<Self> {
        doc.descendants("SharedServer")
            .into_iter()
            .filter_map(|node| {
                Some(Self {
                    id: node.attr("id")?.to_string(),
                    user_id: node.attr_any(&["userID", "user_id"])?.to_string(),
                    machine_identifier: node.attr("machineIdentifier").map(str::to_string),
                    sections: node
                        .children_named("Section")
                        .map(|s| SharedSection {
                            id: s.attr("id").and_then(|v| v.parse().ok()),
                            key: s.attr("key").and_then(|v| v.parse().ok()),
                            title: s.attr("title").unwrap_or_default().to_string(),
                            shared: s.attr("shared") == Some("1"),
                        })
                        .collect(),
                })
            })
            .collect()
    }

    pub fn shared_sections(&self) -> impl Iterator<Item = &SharedSection> {
        self.sections.iter().filter(|s| s.shared)
    }
}

/// A library section from `{server}/library/sections`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySection {
    pub key: i64,
    pub title: String,
}

impl LibrarySection {
    pub fn list_from_xml(doc: &XmlNode) -> Vec<Self> {
        doc.descendants("Directory")
            .into_iter()
            .filter_map(|node| {
                Some(Self {
                    key: node.attr("key")?.parse().ok()?,
                    title: node.attr("title")?.to_string(),
                })
            })
            .collect()
    }
}

pub fn machine_identifier_from_xml(doc: &XmlNode) -> PlexResult<String> {
    doc.root()
        .and_then(|root| root.attr("machineIdentifier"))
        .map(str::to_string)
        .ok_or_else(|| PlexError::NotFound("machineIdentifier".to_string()))
}

/// A playback session reported by the media server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlexSession {
    pub user: Option<String>,
    pub title: String,
    pub player: Option<String>,
}

impl PlexSession {
    pub fn list_from_xml(doc: &XmlNode) -> Vec<Self> {
        let Some(root) = doc.root() else {
            return Vec::new();
        };

        root.children
            .iter()
            .map(|item| {
                let title = match (item.attr("grandparentTitle"), item.attr("title")) {
                    (Some(show), Some(episode)) => format!("{} - {}", show, episode),
                    (None, Some(title)) => title.to_string(),
                    (Some(show), None) => show.to_string(),
                    (None, None) => String::new(),
                };
                Self {
                    user: item
                        .children_named("User")
                        .next()
                        .and_then(|u| u.attr("title"))
                        .map(str::to_string),
                    title,
                    player: item
                        .children_named("Player")
                        .next()
                        .and_then(|p| p.attr_any(&["title", "product"]))
                        .map(str::to_string),
                }
            })
            .collect()
    }
}
