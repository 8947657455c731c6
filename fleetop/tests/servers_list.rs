//! Merged server list: ordering, idempotence and index routing.

use std::net::{IpAddr, Ipv4Addr};

use fleetop::password::PasswordVault;
use fleetop::servers::columns::{parse_columns, DEFAULT_COLUMNS};
use fleetop::servers::discovery::DiscoveryRegistry;
use fleetop::servers::static_list::StaticRegistry;
use fleetop::servers::{Origin, Protocol, ServerField, ServerList, ServerRecord, ServerStatus};

fn list_with(static_names: &[&str]) -> ServerList {
    let records = static_names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            ServerRecord::new(
                format!("{n}:61209"),
                *n,
                format!("10.0.0.{}", i + 1),
                61209,
                Protocol::Rpc,
                Origin::Static,
            )
        })
        .collect();
    ServerList::new(
        StaticRegistry::from_records(records),
        DiscoveryRegistry::disabled(),
        PasswordVault::default(),
        parse_columns(DEFAULT_COLUMNS),
    )
}

fn lan(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
}

fn keys(list: &ServerList) -> Vec<String> {
    list.get_servers_list().iter().map(|r| r.key.clone()).collect()
}

#[test]
fn keys_stay_unique_across_registries() {
    let list = list_with(&["alpha", "alpha", "beta"]);
    list.discovered()
        .add_server("beta:61209", lan(9), 61209, Protocol::Rpc);
    list.discovered()
        .add_server("gamma:61209", lan(3), 61209, Protocol::Rpc);
    list.discovered()
        .add_server("gamma:61209", lan(3), 61209, Protocol::Rpc);

    assert_eq!(keys(&list), ["alpha:61209", "beta:61209", "gamma:61209"]);
    assert_eq!(list.get(1).unwrap().origin, Origin::Static);
}

#[test]
fn static_first_then_discovered() {
    let list = list_with(&["alpha", "beta"]);
    list.discovered()
        .add_server("gamma:61209", lan(3), 61209, Protocol::Rpc);
    list.discovered()
        .add_server("delta:61208", lan(4), 61208, Protocol::Rest);

    assert_eq!(
        keys(&list),
        ["alpha:61209", "beta:61209", "gamma:61209", "delta:61208"]
    );
    let merged = list.get_servers_list();
    assert_eq!(merged.len(), list.static_len() + list.discovered().len());
    assert_eq!(merged[2].origin, Origin::Dynamic);
    assert_eq!(merged[3].protocol, Protocol::Rest);
}

#[test]
fn merge_is_idempotent_without_changes() {
    let list = list_with(&["alpha"]);
    list.discovered()
        .add_server("gamma:61209", lan(3), 61209, Protocol::Rpc);
    let first = keys(&list);
    let second = keys(&list);
    assert_eq!(first, second);
}

#[test]
fn rediscovery_replaces_in_place() {
    let list = list_with(&[]);
    let d = list.discovered();
    d.add_server("a:61209", lan(1), 61209, Protocol::Rpc);
    d.add_server("b:61209", lan(2), 61209, Protocol::Rpc);
    d.get(0).unwrap().set_status(ServerStatus::Online);

    d.add_server("a:61209", lan(1), 61209, Protocol::Rpc);
    assert_eq!(keys(&list), ["a:61209", "b:61209"]);
    assert_eq!(list.get(0).unwrap().status(), ServerStatus::Online);

    d.add_server("a:61209", lan(9), 61209, Protocol::Rpc);
    let moved = list.get(0).unwrap();
    assert_eq!(moved.ip, "192.168.1.9");
    assert_eq!(moved.status(), ServerStatus::Unknown);

    d.remove_server("a:61209");
    assert_eq!(keys(&list), ["b:61209"]);
}

#[test]
fn writes_route_to_the_backing_registry() {
    let list = list_with(&["alpha", "beta"]);
    list.discovered()
        .add_server("gamma:61209", lan(3), 61209, Protocol::Rpc);

    assert!(list.set_in_selected(1, ServerField::Status(ServerStatus::Online)));
    assert!(list.set_in_selected(2, ServerField::Password(Some("digest".into()))));
    assert!(!list.set_in_selected(3, ServerField::Status(ServerStatus::Offline)));

    let merged = list.get_servers_list();
    assert_eq!(merged[0].status(), ServerStatus::Unknown);
    assert_eq!(merged[1].status(), ServerStatus::Online);
    assert_eq!(merged[2].password().as_deref(), Some("digest"));
    assert_eq!(list.discovered().get(0).unwrap().password().as_deref(), Some("digest"));
}
