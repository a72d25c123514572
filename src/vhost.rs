use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A named site configuration: document root plus the server name clients
/// select it with via the `Host` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub server_name: String,
    pub document_root: PathBuf,
}

impl VirtualHost {
    pub fn new(server_name: impl Into<String>, document_root: impl Into<PathBuf>) -> Self {
        Self {
            server_name: server_name.into(),
            document_root: document_root.into(),
        }
    }
}

/// Immutable hostname -> virtual host table with one designated default.
///
/// Lookups are case-sensitive; callers strip any `:port` suffix from the
/// `Host` header before resolving. A miss is not an error -- the default
/// host answers for every name the table does not know.
pub struct HostRegistry {
    hosts: HashMap<String, Arc<VirtualHost>>,
    default: Arc<VirtualHost>,
}

impl HostRegistry {
    /// Builds the registry from the configured host list. The first entry
    /// becomes the default host.
    ///
    /// Returns `None` when `hosts` is empty; a server with no document
    /// roots cannot answer anything.
    pub fn new(hosts: Vec<VirtualHost>) -> Option<Self> {
        let mut iter = hosts.into_iter();
        let default = Arc::new(iter.next()?);

        let mut map = HashMap::new();
        map.insert(default.server_name.clone(), Arc::clone(&default));
        for vh in iter {
            map.insert(vh.server_name.clone(), Arc::new(vh));
        }

        Some(Self {
            hosts: map,
            default,
        })
    }

    /// Exact-name lookup, falling back to the default host on a miss.
    pub fn resolve(&self, server_name: &str) -> &Arc<VirtualHost> {
        self.hosts.get(server_name).unwrap_or(&self.default)
    }

    pub fn default_host(&self) -> &Arc<VirtualHost> {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_host_is_default() {
        let reg = HostRegistry::new(vec![
            VirtualHost::new("a.example", "/srv/a"),
            VirtualHost::new("b.example", "/srv/b"),
        ])
        .unwrap();

        assert_eq!(reg.default_host().server_name, "a.example");
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(HostRegistry::new(Vec::new()).is_none());
    }
}
