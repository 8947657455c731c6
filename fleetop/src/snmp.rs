//! Fallback source: SNMP v2c GET over UDP, for hosts that run an SNMP daemon but no agent.
//!
//! Only the handful of scalar OIDs needed to fill the summary views are read:
//! MIB-II `system` (name, description, uptime) and the UCD-SNMP load, memory and CPU scalars.

use std::{
    net::IpAddr,
    sync::atomic::{AtomicI32, Ordering},
    time::Duration,
};

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::stats::{Load, Stats};

pub const DEFAULT_PORT: u16 = 161;
pub const DEFAULT_COMMUNITY: &str = "public";

pub const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
pub const SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
pub const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
pub const LA_LOAD_1: &str = "1.3.6.1.4.1.2021.10.1.3.1";
pub const LA_LOAD_5: &str = "1.3.6.1.4.1.2021.10.1.3.2";
pub const LA_LOAD_15: &str = "1.3.6.1.4.1.2021.10.1.3.3";
pub const MEM_TOTAL_REAL: &str = "1.3.6.1.4.1.2021.4.5.0";
pub const MEM_AVAIL_REAL: &str = "1.3.6.1.4.1.2021.4.6.0";
pub const SS_CPU_IDLE: &str = "1.3.6.1.4.1.2021.11.11.0";

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB: u8 = 0x82;

pub const PDU_GET: u8 = 0xA0;
pub const PDU_RESPONSE: u8 = 0xA2;

const VERSION_2C: i64 = 1;

#[derive(Debug, Error)]
pub enum SnmpError {
    #[error("snmp i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("no SNMP answer within {0:?}")]
    Timeout(Duration),
    #[error("cannot decode SNMP message: {0}")]
    Decode(&'static str),
    #[error("SNMP agent returned error-status {status} at index {index}")]
    ErrorStatus { status: i64, index: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Int(i64),
    Str(Vec<u8>),
    Oid(String),
    Ip([u8; 4]),
    Counter(u64),
    Gauge(u64),
    TimeTicks(u64),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMib,
}

impl SnmpValue {
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            SnmpValue::Null | SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMib
        )
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            SnmpValue::Str(b) => Some(String::from_utf8_lossy(b).trim().to_string()),
            SnmpValue::Oid(s) => Some(s.clone()),
            SnmpValue::Ip(a) => Some(format!("{}.{}.{}.{}", a[0], a[1], a[2], a[3])),
            SnmpValue::Int(i) => Some(i.to_string()),
            SnmpValue::Counter(v) | SnmpValue::Gauge(v) | SnmpValue::TimeTicks(v) => {
                Some(v.to_string())
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SnmpValue::Int(i) => Some(*i as f64),
            SnmpValue::Counter(v) | SnmpValue::Gauge(v) | SnmpValue::TimeTicks(v) => {
                Some(*v as f64)
            }
            SnmpValue::Str(_) => self.as_text()?.parse().ok(),
            _ => None,
        }
    }
}

// ---- BER ----

fn push_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

fn push_tlv(tag: u8, body: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    push_len(body.len(), out);
    out.extend_from_slice(body);
}

fn int_body(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        if (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

fn uint_body(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn oid_body(oid: &str) -> Result<Vec<u8>, SnmpError> {
    let arcs: Vec<u64> = oid
        .trim_start_matches('.')
        .split('.')
        .map(|s| s.parse::<u64>().map_err(|_| SnmpError::Decode("bad OID text")))
        .collect::<Result<_, _>>()?;
    if arcs.len() < 2 || arcs[0] > 2 {
        return Err(SnmpError::Decode("OID needs two leading arcs"));
    }
    let mut out = Vec::new();
    let mut push_arc = |mut v: u64| {
        let mut tmp = vec![(v & 0x7F) as u8];
        v >>= 7;
        while v > 0 {
            tmp.push(0x80 | (v & 0x7F) as u8);
            v >>= 7;
        }
        tmp.reverse();
        out.extend_from_slice(&tmp);
    };
    push_arc(arcs[0] * 40 + arcs[1]);
    for a in &arcs[2..] {
        push_arc(*a);
    }
    Ok(out)
}

fn push_value(v: &SnmpValue, out: &mut Vec<u8>) -> Result<(), SnmpError> {
    match v {
        SnmpValue::Int(i) => push_tlv(TAG_INTEGER, &int_body(*i), out),
        SnmpValue::Str(b) => push_tlv(TAG_OCTET_STRING, b, out),
        SnmpValue::Oid(s) => push_tlv(TAG_OID, &oid_body(s)?, out),
        SnmpValue::Ip(a) => push_tlv(TAG_IP_ADDRESS, a, out),
        SnmpValue::Counter(c) => push_tlv(TAG_COUNTER32, &uint_body(*c), out),
        SnmpValue::Gauge(g) => push_tlv(TAG_GAUGE32, &uint_body(*g), out),
        SnmpValue::TimeTicks(t) => push_tlv(TAG_TIMETICKS, &uint_body(*t), out),
        SnmpValue::Null => push_tlv(TAG_NULL, &[], out),
        SnmpValue::NoSuchObject => push_tlv(TAG_NO_SUCH_OBJECT, &[], out),
        SnmpValue::NoSuchInstance => push_tlv(TAG_NO_SUCH_INSTANCE, &[], out),
        SnmpValue::EndOfMib => push_tlv(TAG_END_OF_MIB, &[], out),
    }
    Ok(())
}

/// A decoded message: PDU type, request id, error fields and variable bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub community: String,
    pub kind: u8,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(String, SnmpValue)>,
}

pub fn encode_message(pdu: &Pdu) -> Result<Vec<u8>, SnmpError> {
    let mut binds = Vec::new();
    for (oid, value) in &pdu.varbinds {
        let mut bind = Vec::new();
        push_tlv(TAG_OID, &oid_body(oid)?, &mut bind);
        push_value(value, &mut bind)?;
        push_tlv(TAG_SEQUENCE, &bind, &mut binds);
    }
    let mut body = Vec::new();
    push_tlv(TAG_INTEGER, &int_body(pdu.request_id as i64), &mut body);
    push_tlv(TAG_INTEGER, &int_body(pdu.error_status), &mut body);
    push_tlv(TAG_INTEGER, &int_body(pdu.error_index), &mut body);
    push_tlv(TAG_SEQUENCE, &binds, &mut body);

    let mut msg = Vec::new();
    push_tlv(TAG_INTEGER, &int_body(VERSION_2C), &mut msg);
    push_tlv(TAG_OCTET_STRING, pdu.community.as_bytes(), &mut msg);
    push_tlv(pdu.kind, &body, &mut msg);

    let mut out = Vec::with_capacity(msg.len() + 4);
    push_tlv(TAG_SEQUENCE, &msg, &mut out);
    Ok(out)
}

/// GetRequest for `oids`.
pub fn encode_get(community: &str, request_id: i32, oids: &[&str]) -> Result<Vec<u8>, SnmpError> {
    encode_message(&Pdu {
        community: community.to_string(),
        kind: PDU_GET,
        request_id,
        error_status: 0,
        error_index: 0,
        varbinds: oids.iter().map(|o| (o.to_string(), SnmpValue::Null)).collect(),
    })
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn tlv(&mut self) -> Result<(u8, &'a [u8]), SnmpError> {
        let (&tag, rest) = self.buf.split_first().ok_or(SnmpError::Decode("truncated tag"))?;
        let (&first, mut rest) = rest.split_first().ok_or(SnmpError::Decode("truncated length"))?;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7F) as usize;
            if n == 0 || n > 4 || rest.len() < n {
                return Err(SnmpError::Decode("bad length"));
            }
            let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
            rest = &rest[n..];
            len
        };
        if rest.len() < len {
            return Err(SnmpError::Decode("truncated value"));
        }
        let (body, tail) = rest.split_at(len);
        self.buf = tail;
        Ok((tag, body))
    }

    fn expect(&mut self, want: u8) -> Result<&'a [u8], SnmpError> {
        match self.tlv()? {
            (tag, body) if tag == want => Ok(body),
            _ => Err(SnmpError::Decode("unexpected tag")),
        }
    }

    fn int(&mut self) -> Result<i64, SnmpError> {
        decode_int(self.expect(TAG_INTEGER)?)
    }
}

fn decode_int(body: &[u8]) -> Result<i64, SnmpError> {
    if body.is_empty() || body.len() > 8 {
        return Err(SnmpError::Decode("bad integer"));
    }
    let init: i64 = if body[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(body.iter().fold(init, |acc, b| (acc << 8) | *b as i64))
}

fn decode_uint(body: &[u8]) -> Result<u64, SnmpError> {
    if body.is_empty() || body.len() > 9 {
        return Err(SnmpError::Decode("bad unsigned"));
    }
    Ok(body.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn decode_oid(body: &[u8]) -> Result<String, SnmpError> {
    let (&first, rest) = body.split_first().ok_or(SnmpError::Decode("empty OID"))?;
    let (a, b) = if first < 80 { (first / 40, first % 40) } else { (2, first - 80) };
    let mut out = format!("{a}.{b}");
    let mut acc: u64 = 0;
    for byte in rest {
        acc = (acc << 7) | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            out.push('.');
            out.push_str(&acc.to_string());
            acc = 0;
        }
    }
    Ok(out)
}

fn decode_value(tag: u8, body: &[u8]) -> Result<SnmpValue, SnmpError> {
    Ok(match tag {
        TAG_INTEGER => SnmpValue::Int(decode_int(body)?),
        TAG_OCTET_STRING => SnmpValue::Str(body.to_vec()),
        TAG_NULL => SnmpValue::Null,
        TAG_OID => SnmpValue::Oid(decode_oid(body)?),
        TAG_IP_ADDRESS => {
            let a: [u8; 4] = body.try_into().map_err(|_| SnmpError::Decode("bad IpAddress"))?;
            SnmpValue::Ip(a)
        }
        TAG_COUNTER32 | TAG_COUNTER64 => SnmpValue::Counter(decode_uint(body)?),
        TAG_GAUGE32 => SnmpValue::Gauge(decode_uint(body)?),
        TAG_TIMETICKS => SnmpValue::TimeTicks(decode_uint(body)?),
        TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        TAG_END_OF_MIB => SnmpValue::EndOfMib,
        _ => return Err(SnmpError::Decode("unsupported value type")),
    })
}

pub fn decode_message(buf: &[u8]) -> Result<Pdu, SnmpError> {
    let mut outer = Reader::new(buf);
    let mut msg = Reader::new(outer.expect(TAG_SEQUENCE)?);
    let _version = msg.int()?;
    let community = String::from_utf8_lossy(msg.expect(TAG_OCTET_STRING)?).into_owned();
    let (kind, pdu_body) = msg.tlv()?;
    let mut pdu = Reader::new(pdu_body);
    let request_id = pdu.int()? as i32;
    let error_status = pdu.int()?;
    let error_index = pdu.int()?;
    let mut binds = Reader::new(pdu.expect(TAG_SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !binds.is_empty() {
        let mut bind = Reader::new(binds.expect(TAG_SEQUENCE)?);
        let oid = decode_oid(bind.expect(TAG_OID)?)?;
        let (tag, body) = bind.tlv()?;
        varbinds.push((oid, decode_value(tag, body)?));
    }
    Ok(Pdu {
        community,
        kind,
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

// ---- client ----

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

#[derive(Debug, Clone)]
pub struct SnmpClient {
    host: String,
    port: u16,
    community: String,
    timeout: Duration,
}

impl SnmpClient {
    pub fn new(host: &str, port: u16, community: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            community: community.to_string(),
            timeout,
        }
    }

    /// One GET round trip. Missing objects come back as `NoSuchObject`/`NoSuchInstance`.
    pub async fn get(&self, oids: &[&str]) -> Result<Vec<(String, SnmpValue)>, SnmpError> {
        let bind_addr = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => "[::]:0",
            _ => "0.0.0.0:0",
        };
        let sock = UdpSocket::bind(bind_addr).await?;
        sock.connect((self.host.as_str(), self.port)).await?;

        let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed) & i32::MAX;
        sock.send(&encode_get(&self.community, request_id, oids)?).await?;

        let mut buf = vec![0u8; 65_535];
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let n = tokio::time::timeout_at(deadline, sock.recv(&mut buf))
                .await
                .map_err(|_| SnmpError::Timeout(self.timeout))??;
            let pdu = decode_message(&buf[..n])?;
            if pdu.kind != PDU_RESPONSE || pdu.request_id != request_id {
                debug!("dropping stray SNMP datagram (id {})", pdu.request_id);
                continue;
            }
            if pdu.error_status != 0 {
                return Err(SnmpError::ErrorStatus {
                    status: pdu.error_status,
                    index: pdu.error_index,
                });
            }
            return Ok(pdu.varbinds);
        }
    }
}

/// Map a `sysDescr` string to a short OS name.
pub fn short_system_name(descr: &str) -> Option<&'static str> {
    const TABLE: [(&str, &str); 7] = [
        ("Linux", "linux"),
        ("Darwin", "mac"),
        ("BSD", "bsd"),
        ("Windows", "windows"),
        ("Cisco", "cisco"),
        ("VMware ESXi", "esxi"),
        ("NetApp", "netapp"),
    ];
    TABLE
        .iter()
        .find(|(needle, _)| descr.contains(needle))
        .map(|(_, short)| *short)
}

/// `TimeTicks` (hundredths of a second) as `N days, H:MM:SS`.
pub fn format_uptime(ticks: u64) -> String {
    let secs = ticks / 100;
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    if days > 0 {
        format!("{days} days, {h}:{m:02}:{s:02}")
    } else {
        format!("{h}:{m:02}:{s:02}")
    }
}

/// Stats source backed by SNMP.
pub struct SnmpStats {
    client: SnmpClient,
}

impl SnmpStats {
    pub fn new(client: SnmpClient) -> Self {
        Self { client }
    }

    /// Probe: the host must answer `sysName`. Returns it.
    pub async fn check(&self) -> Result<String, SnmpError> {
        let binds = self.client.get(&[SYS_NAME]).await?;
        let name = binds
            .first()
            .filter(|(_, v)| !v.is_missing())
            .and_then(|(_, v)| v.as_text())
            .ok_or(SnmpError::Decode("no sysName"))?;
        info!("SNMP agent answered as {name}");
        Ok(name)
    }

    /// Refresh `stats` in place; objects the host does not expose are left untouched.
    pub async fn update(&self, stats: &mut Stats) -> Result<(), SnmpError> {
        let binds = self
            .client
            .get(&[
                SYS_NAME,
                SYS_DESCR,
                SYS_UPTIME,
                LA_LOAD_1,
                LA_LOAD_5,
                LA_LOAD_15,
                MEM_TOTAL_REAL,
                MEM_AVAIL_REAL,
                SS_CPU_IDLE,
            ])
            .await?;
        let get = |oid: &str| {
            binds
                .iter()
                .find(|(o, _)| o == oid)
                .map(|(_, v)| v)
                .filter(|v| !v.is_missing())
        };

        if let Some(name) = get(SYS_NAME).and_then(SnmpValue::as_text) {
            stats.system.hostname = name;
        }
        if let Some(descr) = get(SYS_DESCR).and_then(SnmpValue::as_text) {
            let short = short_system_name(&descr).unwrap_or("unknown");
            stats.system.os_name = short.to_string();
            stats.system.hr_name = short.to_string();
        }
        if let Some(SnmpValue::TimeTicks(t)) = get(SYS_UPTIME) {
            stats.uptime = Some(format_uptime(*t));
        }
        if let (Some(l1), Some(l5), Some(l15)) = (
            get(LA_LOAD_1).and_then(SnmpValue::as_f64),
            get(LA_LOAD_5).and_then(SnmpValue::as_f64),
            get(LA_LOAD_15).and_then(SnmpValue::as_f64),
        ) {
            stats.load = Some(Load {
                min1: l1,
                min5: l5,
                min15: l15,
                cpucore: stats.load.as_ref().map(|l| l.cpucore).unwrap_or(1),
            });
        }
        if let (Some(total_kb), Some(avail_kb)) = (
            get(MEM_TOTAL_REAL).and_then(SnmpValue::as_f64),
            get(MEM_AVAIL_REAL).and_then(SnmpValue::as_f64),
        ) {
            let total = (total_kb as u64) * 1024;
            let available = (avail_kb as u64) * 1024;
            stats.mem.total = total;
            stats.mem.available = available;
            stats.mem.free = available;
            stats.mem.used = total.saturating_sub(available);
            stats.mem.percent = if total > 0 {
                stats.mem.used as f64 * 100.0 / total as f64
            } else {
                0.0
            };
        }
        if let Some(idle) = get(SS_CPU_IDLE).and_then(SnmpValue::as_f64) {
            stats.cpu.idle = idle;
            stats.cpu.total = 100.0 - idle;
        }
        Ok(())
    }
}
