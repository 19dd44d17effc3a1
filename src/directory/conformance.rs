//! Behaviour every [`Backend`] implementation must share.
//!
//! Call [`check_backend`] from an implementation's tests with a fresh,
//! empty backend.

use super::types::{App, AppLookup, Deploy, DeployState, Dev, Infra, InfraState, Lookup};
use super::Backend;
use indexmap::IndexMap;

pub fn check_backend(b: &dyn Backend) {
    check_apps(b);
    check_infra(b);
    check_blobs(b);
    check_deploys(b);
    check_devs(b);
}

fn check_apps(b: &dyn Backend) {
    let lookup = AppLookup::new("42", "1.2.3", 42);
    assert!(b.get_app(&lookup).unwrap().is_none(), "app should be absent");
    assert!(b.list_apps().unwrap().is_empty());

    let app = App {
        name: "foo".into(),
        app_type: "bar".into(),
        ..App::default()
    };
    b.put_app(&lookup, &app).unwrap();

    let expected = App {
        lookup: lookup.clone(),
        ..app
    };
    assert_eq!(b.get_app(&lookup).unwrap(), Some(expected.clone()));
    assert_eq!(b.list_apps().unwrap(), vec![expected]);

    // Another version of the same app is a separate record.
    let newer = AppLookup::new("42", "1.10.0", 7);
    assert!(b.get_app(&newer).unwrap().is_none());
    b.put_app(&newer, &App { name: "foo".into(), ..App::default() }).unwrap();
    let versions: Vec<_> = b
        .list_apps()
        .unwrap()
        .into_iter()
        .map(|a| a.lookup.version)
        .collect();
    assert_eq!(versions, vec!["1.2.3", "1.10.0"]);
}

fn check_infra(b: &dyn Backend) {
    let lookup = Lookup::infra("foo");
    assert!(b.get_infra(&lookup).unwrap().is_none(), "infra should be absent");

    let mut infra = Infra::new(lookup.clone());
    infra.state = InfraState::Ready;
    infra.outputs.insert("bar".into(), "baz".into());
    b.put_infra(&mut infra).unwrap();
    assert!(!infra.id.is_empty(), "put_infra must assign an id");
    assert_eq!(b.get_infra(&lookup).unwrap(), Some(infra.clone()));

    let id = infra.id.clone();
    infra.state = InfraState::Partial;
    b.put_infra(&mut infra).unwrap();
    assert_eq!(infra.id, id, "an assigned id is kept");

    let foundation = Lookup::infra("foo").with_foundation("consul");
    assert!(b.get_infra(&foundation).unwrap().is_none());
}

fn check_blobs(b: &dyn Backend) {
    assert_eq!(b.get_blob("foo").unwrap(), None);
    b.put_blob("foo", b"bar").unwrap();
    assert_eq!(b.get_blob("foo").unwrap().as_deref(), Some(&b"bar"[..]));
    b.put_blob("foo", b"baz").unwrap();
    assert_eq!(b.get_blob("foo").unwrap().as_deref(), Some(&b"baz"[..]));
}

fn check_deploys(b: &dyn Backend) {
    let lookup = Lookup::infra("bar").with_app("foo").with_flavor("baz");
    assert!(b.get_deploy(&lookup).unwrap().is_none(), "deploy should be absent");

    let mut deploy = Deploy::new(lookup.clone());
    assert!(deploy.id.is_empty());
    b.put_deploy(&mut deploy).unwrap();
    assert!(!deploy.id.is_empty(), "put_deploy must assign an id");
    assert_eq!(b.get_deploy(&lookup).unwrap(), Some(deploy.clone()));

    deploy.mark_successful();
    deploy.deploy = IndexMap::from([("ami".to_string(), "ami-1".to_string())]);
    b.put_deploy(&mut deploy).unwrap();
    let got = b.get_deploy(&lookup).unwrap().unwrap();
    assert_eq!(got.state, DeployState::Success);
    assert_eq!(got.deploy["ami"], "ami-1");
}

fn check_devs(b: &dyn Backend) {
    let lookup = Lookup::default().with_app("foo");
    assert!(b.get_dev(&lookup).unwrap().is_none(), "dev should be absent");

    let mut dev = Dev::new(lookup.clone());
    assert!(dev.id.is_empty());
    b.put_dev(&mut dev).unwrap();
    assert!(!dev.id.is_empty(), "put_dev must assign an id");
    assert_eq!(b.get_dev(&lookup).unwrap(), Some(dev.clone()));

    b.delete_dev(&lookup).unwrap();
    assert!(b.get_dev(&lookup).unwrap().is_none());
    b.delete_dev(&lookup).unwrap();
}
