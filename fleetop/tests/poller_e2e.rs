//! Poller against a real HTTP agent stub: one cycle lands ONLINE with the summary fields.

mod common;

use std::time::Duration;

use fleetop::password::PasswordVault;
use fleetop::poller::Poller;
use fleetop::servers::columns::{parse_columns, DEFAULT_COLUMNS};
use fleetop::servers::discovery::DiscoveryRegistry;
use fleetop::servers::static_list::StaticRegistry;
use fleetop::servers::{Origin, Protocol, ServerList, ServerRecord, ServerStatus};

use common::{closed_port, spawn_rpc_stub};

fn single(port: u16) -> ServerList {
    let alpha = ServerRecord::new(
        format!("alpha:{port}"),
        "alpha",
        "127.0.0.1",
        port,
        Protocol::Rpc,
        Origin::Static,
    );
    ServerList::new(
        StaticRegistry::from_records(vec![alpha]),
        DiscoveryRegistry::disabled(),
        PasswordVault::default(),
        parse_columns(DEFAULT_COLUMNS),
    )
}

async fn wait_for(list: &ServerList, want: ServerStatus) -> bool {
    for _ in 0..100 {
        if list.get(0).map(|r| r.status()) == Some(want) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn online_after_one_cycle() {
    let addr = spawn_rpc_stub(|method| {
        Some(match method {
            "getCpu" => Ok(r#"{"idle":90}"#.into()),
            "getMem" => Ok(r#"{"percent":40}"#.into()),
            "getSystem" => Ok(r#"{"hr_name":"Linux"}"#.into()),
            "getPluginView" => Ok(
                r#"{"total":{"decoration":"CAREFUL"},"percent":{"decoration":"OK"}}"#.into(),
            ),
            _ => Err((-32601, format!("method '{method}' not supported"))),
        })
    })
    .await;

    let list = single(addr.port());
    let mut poller = Poller::new(&list).with_timeout(Duration::from_secs(2));
    assert_eq!(poller.update_servers_stats(&list), 1);
    assert!(wait_for(&list, ServerStatus::Online).await);

    let st = list.get(0).unwrap().snapshot();
    assert_eq!(st.cpu_percent.as_deref(), Some("10.0"));
    assert_eq!(st.mem_percent, Some(40.0));
    assert_eq!(st.hr_name.as_deref(), Some("Linux"));
    assert_eq!(st.load_min5, None);
    assert_eq!(st.extra["cpu_total_decoration"], "CAREFUL");
    assert_eq!(st.extra["mem_percent_decoration"], "OK");
    poller.shutdown().await;
}

#[tokio::test]
async fn rejected_credentials_mark_protected() {
    let addr = spawn_rpc_stub(|_| None).await;
    let list = single(addr.port());
    let mut poller = Poller::new(&list).with_timeout(Duration::from_secs(2));
    poller.update_servers_stats(&list);
    assert!(wait_for(&list, ServerStatus::Protected).await);
    assert!(list.get(0).unwrap().password().is_none());
    poller.shutdown().await;
}

#[tokio::test]
async fn unreachable_is_offline() {
    let list = single(closed_port());
    let mut poller = Poller::new(&list).with_timeout(Duration::from_millis(500));
    poller.update_servers_stats(&list);
    assert!(wait_for(&list, ServerStatus::Offline).await);
    poller.shutdown().await;
}
