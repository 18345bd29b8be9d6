use crossbeam_channel::{unbounded, Sender};
use pnet::datalink::{self, Channel::Ethernet, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::READ_TIMEOUT;
use crate::codec::{build_dns_query, parse_dns_message, DNS_ID, DNS_PORT};
use crate::error::SetupError;
use crate::model::EthTable;
use crate::util::random_str;

/// 探测等待时间
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 网络设备信息
#[derive(Debug, Clone)]
pub struct NetworkDevice {
    pub name: String,
    pub description: Option<String>,
    pub mac: Option<pnet::util::MacAddr>,
    pub ips: Vec<std::net::IpAddr>,
    pub is_up: bool,
    pub is_loopback: bool,
}

/// 列出所有可用的网络设备
pub fn list_network_devices() -> Vec<NetworkDevice> {
    datalink::interfaces()
        .into_iter()
        .map(|interface| NetworkDevice {
            name: interface.name.clone(),
            description: Some(interface.description.clone()),
            mac: interface.mac,
            ips: interface.ips.iter().map(|ip| ip.ip()).collect(),
            is_up: interface.is_up(),
            is_loopback: interface.is_loopback(),
        })
        .collect()
}

/// 打印网络设备列表
pub fn print_network_devices() {
    let devices = list_network_devices();

    println!("\n{:<20} {:<18} {:<15} {:<8} {:<10} {:<30}",
        "设备名称", "MAC地址", "IP地址", "状态", "类型", "描述");
    println!("{}", "-".repeat(100));

    for device in devices {
        let mac_str = device.mac.map_or("N/A".to_string(), |mac| mac.to_string());
        let status = if device.is_up { "UP" } else { "DOWN" };
        let device_type = if device.is_loopback { "LOOPBACK" } else { "ETHERNET" };
        let description = device.description.as_deref().unwrap_or("N/A");

        if device.ips.is_empty() {
            println!("{:<20} {:<18} {:<15} {:<8} {:<10} {:<30}",
                device.name, mac_str, "N/A", status, device_type, description);
        } else {
            for (i, ip) in device.ips.iter().enumerate() {
                if i == 0 {
                    println!("{:<20} {:<18} {:<15} {:<8} {:<10} {:<30}",
                        device.name, mac_str, ip.to_string(), status, device_type, description);
                } else {
                    println!("{:<20} {:<18} {:<15} {:<8} {:<10} {:<30}",
                        "", "", ip.to_string(), "", "", "");
                }
            }
        }
    }
}

fn first_ipv4(interface: &NetworkInterface) -> Option<Ipv4Addr> {
    interface.ips.iter().find_map(|ip| match ip.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    })
}

/// 从抓到的帧中识别探测查询的响应，返回链路地址
///
/// 响应帧的目的MAC是本机网卡，源MAC是网关。
pub(crate) fn match_probe_reply(frame: &[u8], probe: &str, device: &str, src_ip: Ipv4Addr) -> Option<EthTable> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ip = Ipv4Packet::new(ethernet.payload())?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    let udp = UdpPacket::new(ip.payload())?;
    if udp.get_source() != DNS_PORT {
        return None;
    }
    let reply = parse_dns_message(udp.payload()).ok()?;
    if reply.name != probe {
        return None;
    }
    Some(EthTable {
        src_ip,
        device: device.to_string(),
        src_mac: ethernet.get_destination(),
        dst_mac: ethernet.get_source(),
    })
}

/// 在一个网卡上抓包，直到看到探测响应或超时
fn sniff_interface(interface: NetworkInterface, probe: String, found: Sender<EthTable>, stop: Arc<AtomicBool>) {
    let src_ip = match first_ipv4(&interface) {
        Some(ip) => ip,
        None => return,
    };
    let config = datalink::Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    };
    let mut rx = match datalink::channel(&interface, config) {
        Ok(Ethernet(_, rx)) => rx,
        Ok(_) => return,
        Err(e) => {
            log::debug!("网卡 {} 无法抓包: {}", interface.name, e);
            return;
        }
    };

    let deadline = Instant::now() + PROBE_TIMEOUT;
    while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                if let Some(eth) = match_probe_reply(frame, &probe, &interface.name, src_ip) {
                    let _ = found.send(eth);
                    return;
                }
            }
            Err(_) => continue,
        }
    }
}

/// 在候选网卡上监听，通过普通UDP socket发出一个探测查询
fn probe_devices(candidates: Vec<NetworkInterface>, resolver: Ipv4Addr) -> Result<EthTable, SetupError> {
    if candidates.is_empty() {
        return Err(SetupError::NoDevice("没有可用的非回环IPv4网卡".to_string()));
    }
    let probe = format!("{}.example.com", random_str(6));
    log::debug!("探测域名: {}", probe);

    let (tx, rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let mut sniffers = Vec::new();
    for interface in candidates {
        let (tx, stop, probe) = (tx.clone(), stop.clone(), probe.clone());
        sniffers.push(thread::spawn(move || sniff_interface(interface, probe, tx, stop)));
    }
    drop(tx);

    // 等待抓包线程就绪
    thread::sleep(Duration::from_millis(300));
    let query = build_dns_query(&probe, DNS_ID).map_err(|e| SetupError::NoDevice(e.to_string()))?;
    let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(SetupError::PortAlloc)?;
    if let Err(e) = socket.send_to(&query, (resolver, DNS_PORT)) {
        stop.store(true, Ordering::Relaxed);
        return Err(SetupError::NoDevice(format!("发送探测查询失败: {}", e)));
    }

    let result = rx.recv_timeout(PROBE_TIMEOUT);
    stop.store(true, Ordering::Relaxed);
    for sniffer in sniffers {
        let _ = sniffer.join();
    }
    result.map_err(|_| SetupError::NoDevice("探测查询超时，未能确定网关地址".to_string()))
}

/// 根据设备名称获取链路地址
pub fn get_device_by_name(device_name: &str, resolver: Ipv4Addr) -> Result<EthTable, SetupError> {
    let interface = datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == device_name && !iface.is_loopback())
        .ok_or_else(|| SetupError::NoDevice(device_name.to_string()))?;
    if first_ipv4(&interface).is_none() {
        return Err(SetupError::NoDevice(format!("{} 没有IPv4地址", device_name)));
    }
    probe_devices(vec![interface], resolver)
}

/// 自动检测可用网卡
pub fn auto_get_devices(resolver: Ipv4Addr) -> Result<EthTable, SetupError> {
    let candidates = datalink::interfaces()
        .into_iter()
        .filter(|iface| !iface.is_loopback() && iface.is_up() && first_ipv4(iface).is_some())
        .collect();
    probe_devices(candidates, resolver)
}
