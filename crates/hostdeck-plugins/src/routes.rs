//! Route declarations contributed by units.
//!
//! The HTTP layer is an external collaborator; units only declare which
//! paths they handle and under which handler name. The host turns the table
//! into real routes once every unit is active.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecl {
    pub method: Method,
    pub path: String,
    /// Handler name within the owning unit.
    pub handler: String,
    /// Identifier of the declaring unit.
    pub owner: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteDecl>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, decl: RouteDecl) {
        self.routes.push(decl);
    }

    pub fn routes(&self) -> &[RouteDecl] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First declaration matching `method` and `path`.
    pub fn find(&self, method: Method, path: &str) -> Option<&RouteDecl> {
        self.routes
            .iter()
            .find(|r| r.method == method && r.path == path)
    }

    pub fn extend(&mut self, other: RouteTable) {
        self.routes.extend(other.routes);
    }
}
