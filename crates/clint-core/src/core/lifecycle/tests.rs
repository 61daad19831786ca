use std::fs;
use std::io;
use std::sync::Arc;

use clint_domain::{EntityKind, MemoryCatalog, RequestMethod, SharedCatalog};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use super::*;
use crate::core::bagit::{BagItPackager, ValidationReport};
use crate::core::runtime::fake::FakeShell;

struct Fixture {
    _temp: TempDir,
    dir: PathBuf,
    catalog: Arc<MemoryCatalog>,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("scan-0001");
        fs::create_dir_all(dir.join("pages")).expect("dirs");
        fs::write(dir.join("mets.xml"), b"<mets/>").expect("write");
        fs::write(dir.join("pages").join("0001.tif"), b"0123456789").expect("write");
        Self {
            _temp: temp,
            dir,
            catalog: Arc::new(MemoryCatalog::new()),
        }
    }

    fn controller<'a>(&self, shell: &'a FakeShell) -> BagController<'a> {
        self.controller_with(shell, ControllerSettings::default())
    }

    fn controller_with<'a>(
        &self,
        shell: &'a FakeShell,
        settings: ControllerSettings,
    ) -> BagController<'a> {
        let catalog: SharedCatalog = self.catalog.clone();
        BagController::new(catalog, &BagItPackager, shell, settings)
    }

    fn controller_using<'a>(
        &self,
        packager: &'a dyn Packager,
        shell: &'a FakeShell,
    ) -> BagController<'a> {
        let catalog: SharedCatalog = self.catalog.clone();
        BagController::new(catalog, packager, shell, ControllerSettings::default())
    }

    fn row(&self, kind: EntityKind, id: &str) -> Map<String, Value> {
        self.catalog.row(kind, id).expect("row exists")
    }

    fn actions(&self) -> Vec<(String, String)> {
        self.catalog
            .rows(EntityKind::BagAction)
            .into_iter()
            .map(|row| {
                (
                    row["bag"].as_str().unwrap_or_default().to_string(),
                    row["action"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Packages like [`BagItPackager`] but cannot write a bag that carries a
/// catalog id, the way a full disk fails halfway through a rebuild.
struct NoRoomToRebuild;

impl Packager for NoRoomToRebuild {
    fn is_package(&self, path: &Path) -> bool {
        BagItPackager.is_package(path)
    }

    fn make_package(
        &self,
        path: &Path,
        params: &PackageParams,
    ) -> Result<Manifest, PackagingError> {
        if params.tags.contains_key(BAG_ID_TAG) {
            return Err(PackagingError::Io {
                path: path.join("manifest-md5.txt"),
                source: io::Error::new(io::ErrorKind::Other, "no space left on device"),
            });
        }
        BagItPackager.make_package(path, params)
    }

    fn validate(&self, path: &Path) -> Result<ValidationReport, PackagingError> {
        BagItPackager.validate(path)
    }

    fn read_manifest(&self, path: &Path) -> Result<Manifest, PackagingError> {
        BagItPackager.read_manifest(path)
    }

    fn read_tags(&self, path: &Path) -> Result<Tags, PackagingError> {
        BagItPackager.read_tags(path)
    }

    fn write_tags(&self, path: &Path, updates: &Tags) -> Result<(), PackagingError> {
        BagItPackager.write_tags(path, updates)
    }

    fn unpackage(&self, path: &Path) -> Result<Tags, PackagingError> {
        BagItPackager.unpackage(path)
    }
}

fn target() -> CopyTarget {
    CopyTarget {
        host: HostContext::remote("storage-01"),
        destination: "/bags/scan-0001".to_string(),
        volume: "/bags".to_string(),
        machine: Some("M2".to_string()),
    }
}

fn register(fixture: &Fixture, shell: &FakeShell) -> RegisteredBag {
    let controller = fixture.controller(shell);
    let packaged = controller.package(&fixture.dir, false).expect("package");
    controller
        .register(&packaged, &Registration::default())
        .expect("register")
}

#[test]
fn package_register_validate_then_copy_without_space() {
    let fixture = Fixture::new();
    let shell = FakeShell::new()
        .with_volume("/dev/sdb1 100G 95G 5.0G 95% /bags")
        .with_writable("/bags");
    let controller = fixture.controller(&shell);

    let packaged = controller.package(&fixture.dir, false).expect("package");
    assert_eq!(packaged.manifest.entries.len(), 2);
    let registered = controller
        .register(&packaged, &Registration::default())
        .expect("register");
    assert_eq!(registered.item_id, "I1");
    assert_eq!(registered.bag_id, "B1");
    assert_eq!(registered.bagname, "scan-0001");
    assert_eq!(fixture.actions(), vec![("/api/v1/bag/B1/".into(), "1".into())]);

    let bag = fixture.row(EntityKind::Bag, "B1");
    assert_eq!(bag["item"], "/api/v1/item/I1/");
    assert_eq!(bag["bag_type"], "2");
    assert!(bag["payload"]
        .as_str()
        .is_some_and(|payload| payload.contains("data/pages/0001.tif 10")));
    let item = fixture.row(EntityKind::Item, "I1");
    assert_eq!(item["title"], "scan-0001");
    assert_eq!(item["local_id"], "scan-0001");

    let validated = controller.validate(&fixture.dir).expect("validate");
    assert_eq!(validated.bag_id.as_deref(), Some("B1"));
    assert_eq!(validated.action_id.as_deref(), Some("A2"));
    assert_eq!(fixture.catalog.count(EntityKind::Item), 1);
    assert_eq!(fixture.catalog.count(EntityKind::Bag), 1);
    assert_eq!(fixture.actions()[1], ("/api/v1/bag/B1/".into(), "4".into()));

    fixture.catalog.clear_requests();
    let err = controller
        .copy(&validated, &target())
        .expect_err("5% free is below the reserve");
    assert!(matches!(err, LifecycleError::InsufficientSpace { .. }));
    assert!(err.is_user_error());
    assert_eq!(err.details()["reason"], "insufficient_space");
    assert!(shell.copies().is_empty());
    assert!(fixture.catalog.requests().is_empty());
    assert_eq!(fixture.actions().len(), 2);
    assert_eq!(fixture.row(EntityKind::Bag, "B1")["path"], json!(fixture.dir.display().to_string()));
}

#[test]
fn copies_update_the_bag_and_record_the_replica() {
    let fixture = Fixture::new();
    let shell = FakeShell::new()
        .with_volume("/dev/sdb1 100G 10G 90G 10% /bags")
        .with_writable("/bags");
    let registered = register(&fixture, &shell);
    let controller = fixture.controller(&shell);
    let validated = controller.validate(&registered.path).expect("validate");

    let replicated = controller
        .copy(&validated, &target())
        .expect("copy");
    assert_eq!(replicated.plan, CopyPlan::DirectCopy);
    assert_eq!(replicated.bag_id, "B1");

    let copies = shell.copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].host.as_deref(), Some("storage-01"));
    assert!(!copies[0].elevated);

    let bag = fixture.row(EntityKind::Bag, "B1");
    assert_eq!(bag["path"], "/bags/scan-0001");
    assert_eq!(bag["machine"], "/api/v1/machine/M2/");
    assert_eq!(
        fixture.actions().last().map(|(_, action)| action.as_str()),
        Some("7")
    );
    assert_eq!(
        fixture
            .catalog
            .count_requests(RequestMethod::Post, EntityKind::Bag),
        1
    );
}

#[test]
fn read_only_destinations_copy_with_elevation() {
    let fixture = Fixture::new();
    let shell = FakeShell::new()
        .with_volume("/dev/sdb1 100G 10G 90G 10% /bags")
        .with_existing("/bags");
    let registered = register(&fixture, &shell);
    let controller = fixture.controller(&shell);
    let validated = controller.validate(&registered.path).expect("validate");
    let replicated = controller
        .copy(&validated, &target())
        .expect("copy");
    assert_eq!(replicated.plan, CopyPlan::ElevatedCopy);
    assert!(shell.copies()[0].elevated);

    let settings = ControllerSettings {
        replication: ReplicationConfig {
            reserved_percent: 10,
            allow_elevation: false,
        },
        ..ControllerSettings::default()
    };
    let err = fixture
        .controller_with(&shell, settings)
        .copy(&validated, &target())
        .expect_err("elevation disabled");
    assert!(matches!(err, LifecycleError::PermissionDenied { .. }));
    assert_eq!(shell.copies().len(), 1);
}

#[test]
fn failed_transfers_leave_the_catalog_alone() {
    let fixture = Fixture::new();
    let shell = FakeShell::new()
        .with_volume("/dev/sdb1 100G 10G 90G 10% /bags")
        .with_writable("/bags");
    let registered = register(&fixture, &shell);
    let controller = fixture.controller(&shell);
    let validated = controller.validate(&registered.path).expect("validate");
    shell.fail_copies();
    fixture.catalog.clear_requests();

    let err = controller
        .copy(&validated, &target())
        .expect_err("transfer fails");
    assert!(matches!(err, LifecycleError::Transfer { .. }));
    assert_eq!(err.state(), BagState::Failed);
    assert!(!err.is_user_error());
    assert!(fixture.catalog.requests().is_empty());
}

#[test]
fn repackaging_updates_the_existing_bag() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    register(&fixture, &shell);
    fs::write(fixture.dir.join("data").join("notes.txt"), b"late addition").expect("write");

    let controller = fixture.controller(&shell);
    let err = controller
        .validate(&fixture.dir)
        .expect_err("payload changed");
    assert!(matches!(err, LifecycleError::InvalidPackage { .. }));

    let repackaged = controller.repackage(&fixture.dir).expect("repackage");
    assert_eq!(repackaged.bag_id, "B1");
    assert_eq!(repackaged.manifest.entries.len(), 3);
    assert_eq!(fixture.catalog.count(EntityKind::Bag), 1);
    assert_eq!(
        fixture
            .catalog
            .count_requests(RequestMethod::Put, EntityKind::Bag),
        1
    );
    let bag = fixture.row(EntityKind::Bag, "B1");
    assert!(bag["payload"]
        .as_str()
        .is_some_and(|payload| payload.contains("data/notes.txt 13")));
    assert_eq!(
        fixture.actions().last().cloned(),
        Some(("/api/v1/bag/B1/".to_string(), "2".to_string()))
    );
    assert!(!fixture.actions().iter().skip(1).any(|(_, action)| action == "1"));

    let handle = controller.open(&fixture.dir).expect("open");
    assert_eq!(handle.state, BagState::Registered);
    assert_eq!(handle.bag_id.as_deref(), Some("B1"));
    assert_eq!(handle.item_id.as_deref(), Some("I1"));
    controller.validate(&fixture.dir).expect("valid again");
}

#[test]
fn failed_rebuilds_keep_the_bag_and_its_catalog_id() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    register(&fixture, &shell);
    fs::write(fixture.dir.join("data").join("notes.txt"), b"late addition").expect("write");
    fixture.catalog.clear_requests();

    let controller = fixture.controller_using(&NoRoomToRebuild, &shell);
    let err = controller
        .repackage(&fixture.dir)
        .expect_err("rebuild fails");
    match &err {
        LifecycleError::PartialUpdate { bag_id, step, .. } => {
            assert_eq!(bag_id, "B1");
            assert_eq!(*step, "package");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.state(), BagState::Failed);
    assert_eq!(err.details()["bag_id"], "B1");

    let handle = controller.open(&fixture.dir).expect("open");
    assert_eq!(handle.state, BagState::Registered);
    assert_eq!(handle.bag_id.as_deref(), Some("B1"));
    let parent = fixture.dir.parent().expect("parent");
    let names: Vec<String> = fs::read_dir(parent)
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, ["scan-0001"]);
    assert_eq!(
        fixture
            .catalog
            .count_requests(RequestMethod::Put, EntityKind::Bag),
        0
    );

    // The directory is still tied to B1, so the retry updates it rather
    // than registering a second Bag.
    let controller = fixture.controller(&shell);
    let err = controller
        .package(&fixture.dir, false)
        .expect_err("still registered");
    assert!(matches!(
        err,
        LifecycleError::AlreadyPackaged { bag_id: Some(ref id), .. } if id == "B1"
    ));
    let repackaged = controller.repackage(&fixture.dir).expect("retry");
    assert_eq!(repackaged.bag_id, "B1");
    assert_eq!(repackaged.manifest.entries.len(), 3);
    assert_eq!(fixture.catalog.count(EntityKind::Bag), 1);
    controller.validate(&fixture.dir).expect("valid");
}

#[test]
fn preflight_rejects_copies_before_anything_is_recorded() {
    let fixture = Fixture::new();
    let shell = FakeShell::new()
        .with_volume("/dev/sdb1 100G 95G 5.0G 95% /bags")
        .with_writable("/bags");
    let controller = fixture.controller(&shell);
    controller.package(&fixture.dir, false).expect("package");

    let err = controller
        .preflight(&fixture.dir, &target())
        .expect_err("not registered");
    assert!(matches!(err, LifecycleError::NotRegistered { .. }));
    assert!(shell.commands().is_empty());

    register(&fixture, &shell);
    fixture.catalog.clear_requests();
    let err = controller
        .preflight(&fixture.dir, &target())
        .expect_err("5% free is below the reserve");
    assert!(matches!(err, LifecycleError::InsufficientSpace { .. }));
    assert!(fixture.catalog.requests().is_empty());
    assert_eq!(fixture.catalog.count(EntityKind::BagAction), 1);
}

#[test]
fn failed_bag_creation_reports_the_saved_item() {
    let fixture = Fixture::new();
    fixture
        .catalog
        .fail(RequestMethod::Post, EntityKind::Bag, 500);
    let shell = FakeShell::new();
    let controller = fixture.controller(&shell);
    let packaged = controller.package(&fixture.dir, false).expect("package");

    let err = controller
        .register(&packaged, &Registration::default())
        .expect_err("bag create fails");
    match &err {
        LifecycleError::PartialRegistration {
            step,
            item_id,
            bag_id,
            ..
        } => {
            assert_eq!(*step, "create bag");
            assert_eq!(item_id, "I1");
            assert_eq!(bag_id, &None);
            assert_eq!(err.details()["item_origin"], "created");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.state(), BagState::Failed);
    assert!(!err.is_user_error());
    assert_eq!(err.details()["item_id"], "I1");
    assert_eq!(fixture.catalog.count(EntityKind::Item), 1);
    assert_eq!(fixture.catalog.count(EntityKind::BagAction), 0);
    assert_eq!(controller.open(&fixture.dir).expect("open").state, BagState::Packaged);
}

#[test]
fn bad_registration_values_fail_before_any_write() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    let controller = fixture.controller(&shell);
    let packaged = controller.package(&fixture.dir, false).expect("package");

    let registration = Registration {
        bag_type: Some("archival".to_string()),
        ..Registration::default()
    };
    let err = controller
        .register(&packaged, &registration)
        .expect_err("unknown bag type");
    assert!(matches!(err, LifecycleError::Catalog { step: "prepare bag", .. }));
    assert!(err.is_user_error());
    assert_eq!(err.reason(), "invalid_value");
    assert!(fixture.catalog.requests().is_empty());
}

#[test]
fn registration_can_reuse_an_item_and_apply_defaults() {
    let fixture = Fixture::new();
    fixture.catalog.insert(
        EntityKind::Item,
        "I9",
        json!({ "title": "Ledger", "local_id": "ledger-1" }),
    );
    let shell = FakeShell::new();
    let settings = ControllerSettings {
        bagging: BaggingConfig {
            default_machine: Some("M1".to_string()),
            contact: Some("Preservation Desk".to_string()),
        },
        ..ControllerSettings::default()
    };
    let controller = fixture.controller_with(&shell, settings);
    let packaged = controller.package(&fixture.dir, false).expect("package");
    let registration = Registration {
        item: Some("I9".to_string()),
        item_type: Some("microfilm".to_string()),
        bag_type: Some("access".to_string()),
        access_path: Some("/bags/access/scan-0001".to_string()),
        ..Registration::default()
    };
    let registered = controller
        .register(&packaged, &registration)
        .expect("register");
    assert_eq!(registered.item_id, "I9");
    assert_eq!(
        fixture
            .catalog
            .count_requests(RequestMethod::Post, EntityKind::Item),
        0
    );
    let item = fixture.row(EntityKind::Item, "I9");
    assert_eq!(item["title"], "Ledger");
    assert_eq!(item["original_item_type"], "2");

    let bag = fixture.row(EntityKind::Bag, &registered.bag_id);
    assert_eq!(bag["machine"], "/api/v1/machine/M1/");
    assert_eq!(bag["bag_type"], "1");
    assert_eq!(bag["path"], "/bags/access/scan-0001");

    let tags = BagItPackager.read_tags(&fixture.dir).expect("tags");
    assert_eq!(find_tag(&tags, "Contact-Name"), Some("Preservation Desk"));
}

#[test]
fn reused_items_are_reported_as_reused_and_not_rewritten() {
    let fixture = Fixture::new();
    fixture.catalog.insert(
        EntityKind::Item,
        "I9",
        json!({ "title": "Ledger", "local_id": "ledger-1" }),
    );
    fixture
        .catalog
        .fail(RequestMethod::Post, EntityKind::Bag, 500);
    let shell = FakeShell::new();
    let controller = fixture.controller(&shell);
    let packaged = controller.package(&fixture.dir, false).expect("package");
    let registration = Registration {
        item: Some("I9".to_string()),
        title: Some("Ledger".to_string()),
        ..Registration::default()
    };

    let err = controller
        .register(&packaged, &registration)
        .expect_err("bag create fails");
    match &err {
        LifecycleError::PartialRegistration {
            item_id,
            item_origin,
            ..
        } => {
            assert_eq!(item_id, "I9");
            assert_eq!(*item_origin, ItemOrigin::Reused);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("item I9 was reused"));
    assert_eq!(err.details()["item_origin"], "reused");
    assert_eq!(
        fixture
            .catalog
            .count_requests(RequestMethod::Put, EntityKind::Item),
        0
    );
    assert_eq!(fixture.catalog.count(EntityKind::Item), 1);
}

#[test]
fn unregistered_bags_validate_without_the_catalog() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    let controller = fixture.controller(&shell);
    controller.package(&fixture.dir, false).expect("package");

    let validated = controller.validate(&fixture.dir).expect("validate");
    assert!(!validated.is_registered());
    assert!(fixture.catalog.requests().is_empty());

    let err = controller
        .copy(&validated, &target())
        .expect_err("needs a bag id");
    assert!(matches!(err, LifecycleError::NotRegistered { .. }));
    assert!(shell.commands().is_empty());
}

#[test]
fn invalid_bags_surface_their_identity() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    register(&fixture, &shell);
    fs::write(fixture.dir.join("data").join("mets.xml"), b"<METS/>").expect("tamper");

    let err = fixture
        .controller(&shell)
        .validate(&fixture.dir)
        .expect_err("checksum mismatch");
    assert_eq!(err.state(), BagState::Failed);
    let details = err.details();
    assert_eq!(details["bag_id"], "B1");
    assert_eq!(details["state"], "failed");
    assert!(details["problems"][0]
        .as_str()
        .is_some_and(|problem| problem.contains("data/mets.xml")));
    assert_eq!(fixture.catalog.count(EntityKind::BagAction), 1);
}

#[test]
fn existing_bags_need_an_explicit_decision() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    let controller = fixture.controller(&shell);
    controller.package(&fixture.dir, false).expect("package");

    let err = controller
        .package(&fixture.dir, false)
        .expect_err("already a bag");
    assert!(matches!(err, LifecycleError::AlreadyPackaged { bag_id: None, .. }));
    assert_eq!(err.state(), BagState::Packaged);
    controller.package(&fixture.dir, true).expect("forced");

    let err = controller
        .validate(fixture.dir.join("data").as_path())
        .expect_err("payload dir is not a bag");
    assert!(matches!(err, LifecycleError::NotPackaged { .. }));
}

#[test]
fn registered_bags_are_repackaged_not_packaged() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    register(&fixture, &shell);
    let controller = fixture.controller(&shell);

    let err = controller
        .package(&fixture.dir, true)
        .expect_err("registered");
    assert!(matches!(err, LifecycleError::AlreadyRegistered { .. }));
    let err = controller
        .package(&fixture.dir, false)
        .expect_err("registered");
    assert!(matches!(
        err,
        LifecycleError::AlreadyPackaged {
            bag_id: Some(_),
            ..
        }
    ));
    assert_eq!(err.state(), BagState::Registered);
}

#[test]
fn repackaging_an_unknown_bag_leaves_the_directory_alone() {
    let fixture = Fixture::new();
    let shell = FakeShell::new();
    let controller = fixture.controller(&shell);
    controller.package(&fixture.dir, false).expect("package");
    let mut tags = Tags::new();
    tags.insert(BAG_ID_TAG.to_string(), "B5".to_string());
    BagItPackager.write_tags(&fixture.dir, &tags).expect("tag");

    let err = controller
        .repackage(&fixture.dir)
        .expect_err("unknown bag");
    assert!(matches!(err, LifecycleError::Catalog { step: "load bag", .. }));
    assert_eq!(err.reason(), "not_found");
    assert!(BagItPackager.is_package(&fixture.dir));
}
