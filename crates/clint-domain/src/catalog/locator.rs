use crate::entity::EntityKind;

/// The path every resource lives under. `mount` is the path the catalog is
/// served from, `/` for a catalog at the host root.
#[must_use]
pub fn api_root(mount: &str, version: &str) -> String {
    let mount = mount.trim_matches('/');
    let version = version.trim_matches('/');
    if mount.is_empty() {
        format!("/api/{version}/")
    } else {
        format!("/{mount}/api/{version}/")
    }
}

#[must_use]
pub fn collection_uri(api_root: &str, kind: EntityKind) -> String {
    format!("{api_root}{kind}/")
}

#[must_use]
pub fn resource_uri(api_root: &str, kind: EntityKind, id: &str) -> String {
    format!("{api_root}{kind}/{}/", id.trim_matches('/'))
}

/// Extracts the identity from a resource locator: every path segment after
/// the `{api_root}{kind}/` prefix. Works on bare paths and absolute URLs.
#[must_use]
pub fn identity_from_locator(api_root: &str, kind: EntityKind, locator: &str) -> Option<String> {
    let prefix = collection_uri(api_root, kind);
    let start = locator.find(&prefix)? + prefix.len();
    let rest = locator[start..]
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/');
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_keep_every_trailing_segment() {
        let root = api_root("/", "v1");
        assert_eq!(root, "/api/v1/");
        assert_eq!(
            identity_from_locator(
                &root,
                EntityKind::Item,
                "http://inventory.example:80/api/v1/item/12345/i000000031/"
            )
            .as_deref(),
            Some("12345/i000000031")
        );
        assert_eq!(
            identity_from_locator(&root, EntityKind::Bag, "/api/v1/bag/B1/?format=json")
                .as_deref(),
            Some("B1")
        );
    }

    #[test]
    fn locators_for_other_kinds_do_not_match() {
        let root = api_root("", "/v1/");
        assert_eq!(
            identity_from_locator(&root, EntityKind::Bag, "/api/v1/bagaction/7/"),
            None
        );
        assert_eq!(identity_from_locator(&root, EntityKind::Bag, "/api/v1/bag/"), None);
    }

    #[test]
    fn mounted_catalogs_keep_their_prefix() {
        let root = api_root("/inventory/", "v1");
        assert_eq!(root, "/inventory/api/v1/");
        assert_eq!(
            resource_uri(&root, EntityKind::Item, "I1"),
            "/inventory/api/v1/item/I1/"
        );
        assert_eq!(
            identity_from_locator(
                &root,
                EntityKind::Bag,
                "http://catalog.example/inventory/api/v1/bag/B1/"
            )
            .as_deref(),
            Some("B1")
        );
    }

    #[test]
    fn resource_uri_is_the_inverse() {
        let root = api_root("/", "v1");
        let uri = resource_uri(&root, EntityKind::Collection, "12345/c00000000001");
        assert_eq!(uri, "/api/v1/collection/12345/c00000000001/");
        assert_eq!(
            identity_from_locator(&root, EntityKind::Collection, &uri).as_deref(),
            Some("12345/c00000000001")
        );
    }
}
