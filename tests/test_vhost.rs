use std::path::Path;
use vhostd::vhost::{HostRegistry, VirtualHost};

fn registry() -> HostRegistry {
    HostRegistry::new(vec![
        VirtualHost::new("main.example", "/srv/main"),
        VirtualHost::new("docs.example", "/srv/docs"),
    ])
    .unwrap()
}

#[test]
fn known_name_resolves_to_its_host() {
    let reg = registry();
    assert_eq!(
        reg.resolve("docs.example").document_root,
        Path::new("/srv/docs")
    );
}

#[test]
fn unknown_name_falls_back_to_default() {
    let reg = registry();
    let vh = reg.resolve("unknown.example");
    assert_eq!(vh.server_name, "main.example");
    assert_eq!(vh.document_root, Path::new("/srv/main"));
}

#[test]
fn lookup_is_case_sensitive() {
    // Callers normalize nothing but the :port suffix; a differently-cased
    // name is a miss and lands on the default host.
    let reg = registry();
    assert_eq!(reg.resolve("DOCS.example").server_name, "main.example");
}
