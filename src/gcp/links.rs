//! Compute resource paths and links
//!
//! Records are stored under their relative path
//! (`projects/p/zones/z/disks/d`); `selfLink` and every other URL field is
//! that path under the configured base URL.

use crate::core::OperationScope;

/// Path of a location (`projects/p/global`, `projects/p/zones/z`)
pub fn scope_path(project: &str, scope: &OperationScope) -> String {
    format!("projects/{}/{}", project, scope.path())
}

/// Path of a collection (`projects/p/zones/z/disks`)
pub fn collection_path(project: &str, scope: &OperationScope, collection: &str) -> String {
    format!("{}/{}", scope_path(project, scope), collection)
}

/// Canonical path of one resource
pub fn resource_path(project: &str, scope: &OperationScope, collection: &str, name: &str) -> String {
    format!("{}/{}", collection_path(project, scope, collection), name)
}

pub fn global_path(project: &str, collection: &str, name: &str) -> String {
    resource_path(project, &OperationScope::Global, collection, name)
}

pub fn regional_path(project: &str, region: &str, collection: &str, name: &str) -> String {
    resource_path(
        project,
        &OperationScope::Region(region.to_string()),
        collection,
        name,
    )
}

pub fn zonal_path(project: &str, zone: &str, collection: &str, name: &str) -> String {
    resource_path(project, &OperationScope::Zone(zone.to_string()), collection, name)
}

/// Absolute URL of a relative path
pub fn absolute(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Last path segment of a name, path or URL
pub fn short_name(link: &str) -> &str {
    link.trim_end_matches('/').rsplit('/').next().unwrap_or(link)
}

/// Segment following `marker` in a path or URL
/// (`segment_after(".../regions/us-east1/subnetworks/s", "regions")`)
pub fn segment_after<'a>(link: &'a str, marker: &str) -> Option<&'a str> {
    let mut parts = link.split('/');
    parts.find(|part| *part == marker)?;
    parts.next().filter(|s| !s.is_empty())
}

/// Region of a zone (`us-central1-a` -> `us-central1`)
pub fn region_of(zone: &str) -> String {
    let parts: Vec<&str> = zone.rsplitn(2, '-').collect();
    if parts.len() == 2 {
        parts[1].to_string()
    } else {
        zone.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(global_path("p", "networks", "default"), "projects/p/global/networks/default");
        assert_eq!(
            regional_path("p", "us-east1", "subnetworks", "s"),
            "projects/p/regions/us-east1/subnetworks/s"
        );
        assert_eq!(
            zonal_path("p", "us-central1-a", "disks", "d"),
            "projects/p/zones/us-central1-a/disks/d"
        );
        assert_eq!(
            absolute("http://localhost:5000/compute/v1/", "projects/p/global/networks/n"),
            "http://localhost:5000/compute/v1/projects/p/global/networks/n"
        );
    }

    #[test]
    fn test_short_name_normalizes_references() {
        for link in [
            "default",
            "global/networks/default",
            "projects/p/global/networks/default",
            "https://www.googleapis.com/compute/v1/projects/p/global/networks/default",
        ] {
            assert_eq!(short_name(link), "default");
        }
    }

    #[test]
    fn test_segment_after() {
        let link = "https://x/compute/v1/projects/p/regions/us-east1/subnetworks/s";
        assert_eq!(segment_after(link, "regions"), Some("us-east1"));
        assert_eq!(segment_after(link, "projects"), Some("p"));
        assert_eq!(segment_after(link, "zones"), None);
    }

    #[test]
    fn test_region_of_zone() {
        assert_eq!(region_of("us-central1-a"), "us-central1");
        assert_eq!(region_of("europe-west1-b"), "europe-west1");
        assert_eq!(region_of("nodash"), "nodash");
    }
}
