//! 链路层DNS报文的构造与解析
//!
//! 发出的查询是 以太网 / IPv4 / UDP / DNS 四层结构，长度和校验和在序列化时计算。
//! 所有查询共用同一个事务ID，响应只按问题域名与状态表对应。

use byteorder::{BigEndian, ByteOrder};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::udp::{ipv4_checksum, MutableUdpPacket, UdpPacket};
use pnet::packet::Packet;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::CodecError;
use crate::model::{Answer, EthTable};

/// 固定的DNS事务ID
pub const DNS_ID: u16 = 0x2021;
pub const DNS_PORT: u16 = 53;
const IP_TTL: u8 = 255;

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const DNS_HEADER_LEN: usize = 12;
const MAX_POINTER_JUMPS: usize = 32;

const TYPE_A: u16 = 1;
const TYPE_NS: u16 = 2;
const TYPE_CNAME: u16 = 5;
const TYPE_PTR: u16 = 12;
const TYPE_MX: u16 = 15;
const TYPE_TXT: u16 = 16;
const TYPE_AAAA: u16 = 28;
const CLASS_IN: u16 = 1;

/// 解析出的DNS响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsReply {
    pub id: u16,
    pub rcode: u8,
    pub name: String,
    pub answers: Vec<Answer>,
}

/// 把域名编码为DNS标签序列
fn encode_name(domain: &str, buffer: &mut Vec<u8>) -> Result<(), CodecError> {
    let name = domain.trim_end_matches('.');
    if name.is_empty() || name.len() > 253 {
        return Err(CodecError::InvalidName(domain.to_string()));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(CodecError::InvalidName(domain.to_string()));
        }
        buffer.push(label.len() as u8);
        buffer.extend_from_slice(label.as_bytes());
    }
    buffer.push(0);
    Ok(())
}

/// 构造单个问题的A记录查询，设置递归查询标识
pub fn build_dns_query(domain: &str, id: u16) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Vec::with_capacity(DNS_HEADER_LEN + domain.len() + 6);

    buffer.extend_from_slice(&id.to_be_bytes());
    buffer.extend_from_slice(&[0x01, 0x00]); // Flags: RD
    buffer.extend_from_slice(&[0x00, 0x01]); // Questions
    buffer.extend_from_slice(&[0x00, 0x00]); // Answer RRs
    buffer.extend_from_slice(&[0x00, 0x00]); // Authority RRs
    buffer.extend_from_slice(&[0x00, 0x00]); // Additional RRs

    encode_name(domain, &mut buffer)?;

    buffer.extend_from_slice(&TYPE_A.to_be_bytes());
    buffer.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(buffer)
}

/// 构造完整的以太网帧
pub fn build_query_frame(
    ether: &EthTable,
    src_port: u16,
    dst: Ipv4Addr,
    domain: &str,
) -> Result<Vec<u8>, CodecError> {
    let dns_query = build_dns_query(domain, DNS_ID)?;
    build_udp_frame(ether, src_port, dst, DNS_PORT, &dns_query)
}

pub(crate) fn build_udp_frame(
    ether: &EthTable,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let total_length = IPV4_HEADER_LEN + udp_len;
    if total_length > u16::MAX as usize {
        return Err(CodecError::Packet("ipv4"));
    }

    let mut udp_buffer = vec![0u8; udp_len];
    let mut udp = MutableUdpPacket::new(&mut udp_buffer).ok_or(CodecError::Packet("udp"))?;
    udp.set_source(src_port);
    udp.set_destination(dst_port);
    udp.set_length(udp_len as u16);
    udp.set_payload(payload);
    let checksum = ipv4_checksum(&udp.to_immutable(), &ether.src_ip, &dst);
    udp.set_checksum(checksum);

    let mut ipv4_buffer = [0u8; IPV4_HEADER_LEN];
    let mut ip = MutableIpv4Packet::new(&mut ipv4_buffer).ok_or(CodecError::Packet("ipv4"))?;
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length(total_length as u16);
    ip.set_ttl(IP_TTL);
    ip.set_flags(Ipv4Flags::DontFragment);
    ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
    ip.set_source(ether.src_ip);
    ip.set_destination(dst);
    let checksum = ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(checksum);

    let mut ethernet_buffer = [0u8; ETHERNET_HEADER_LEN];
    let mut ethernet =
        MutableEthernetPacket::new(&mut ethernet_buffer).ok_or(CodecError::Packet("ethernet"))?;
    ethernet.set_destination(ether.dst_mac);
    ethernet.set_source(ether.src_mac);
    ethernet.set_ethertype(EtherTypes::Ipv4);

    let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + total_length);
    frame.extend_from_slice(ethernet.packet());
    frame.extend_from_slice(ip.packet());
    frame.extend_from_slice(udp.packet());
    Ok(frame)
}

/// 从抓到的帧中解析发往本地端口的DNS响应，无关流量返回None
pub fn decode_frame(frame: &[u8], local_port: u16) -> Option<DnsReply> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ip = Ipv4Packet::new(ethernet.payload())?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    let udp = UdpPacket::new(ip.payload())?;
    if udp.get_destination() != local_port || udp.get_source() != DNS_PORT {
        return None;
    }
    match parse_dns_message(udp.payload()) {
        Ok(reply) => Some(reply),
        Err(e) => {
            log::debug!("丢弃无法解析的响应: {}", e);
            None
        }
    }
}

fn read_u16(msg: &[u8], pos: usize) -> Result<u16, CodecError> {
    msg.get(pos..pos + 2)
        .map(BigEndian::read_u16)
        .ok_or(CodecError::Truncated(pos))
}

/// 读取（可能被压缩的）域名，返回域名和紧随其后的偏移
fn read_name(msg: &[u8], start: usize) -> Result<(String, usize), CodecError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut next = None;
    let mut jumps = 0;

    loop {
        let len = *msg.get(pos).ok_or(CodecError::Truncated(pos))? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            let target = (read_u16(msg, pos)? & 0x3FFF) as usize;
            if next.is_none() {
                next = Some(pos + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS || target >= msg.len() {
                return Err(CodecError::Malformed("name pointer loop"));
            }
            pos = target;
            continue;
        }
        if len & 0xC0 != 0 {
            return Err(CodecError::Malformed("reserved label type"));
        }
        let label = msg
            .get(pos + 1..pos + 1 + len)
            .ok_or(CodecError::Truncated(pos + 1))?;
        labels.push(String::from_utf8_lossy(label).to_ascii_lowercase());
        pos += len + 1;
    }

    Ok((labels.join("."), next.unwrap_or(pos)))
}

fn parse_txt(data: &[u8]) -> String {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if i + 1 + len > data.len() {
            break;
        }
        parts.push(String::from_utf8_lossy(&data[i + 1..i + 1 + len]).to_string());
        i += len + 1;
    }
    parts.join(" ")
}

fn parse_answer(msg: &[u8], rtype: u16, rdata_pos: usize, rdata: &[u8]) -> Result<Answer, CodecError> {
    let answer = match rtype {
        TYPE_A if rdata.len() == 4 => Answer::A(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3])),
        TYPE_AAAA if rdata.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Answer::AAAA(Ipv6Addr::from(octets))
        }
        TYPE_CNAME => Answer::CNAME(read_name(msg, rdata_pos)?.0),
        TYPE_NS => Answer::NS(read_name(msg, rdata_pos)?.0),
        TYPE_PTR => Answer::PTR(read_name(msg, rdata_pos)?.0),
        TYPE_MX if rdata.len() >= 3 => {
            let preference = BigEndian::read_u16(rdata);
            Answer::MX(preference, read_name(msg, rdata_pos + 2)?.0)
        }
        TYPE_TXT => Answer::TXT(parse_txt(rdata)),
        TYPE_A | TYPE_AAAA | TYPE_MX => return Err(CodecError::Malformed("bad rdata length")),
        other => Answer::Other(other),
    };
    Ok(answer)
}

/// 解析DNS响应报文
pub fn parse_dns_message(msg: &[u8]) -> Result<DnsReply, CodecError> {
    if msg.len() < DNS_HEADER_LEN {
        return Err(CodecError::Truncated(msg.len()));
    }
    let id = BigEndian::read_u16(&msg[0..2]);
    if msg[2] & 0x80 == 0 {
        return Err(CodecError::NotResponse);
    }
    let rcode = msg[3] & 0x0F;
    let qdcount = BigEndian::read_u16(&msg[4..6]);
    let ancount = BigEndian::read_u16(&msg[6..8]);
    if qdcount == 0 {
        return Err(CodecError::Malformed("no question"));
    }

    let mut pos = DNS_HEADER_LEN;
    let mut name = String::new();
    for i in 0..qdcount {
        let (qname, next) = read_name(msg, pos)?;
        if i == 0 {
            name = qname;
        }
        pos = next + 4;
        if pos > msg.len() {
            return Err(CodecError::Truncated(pos));
        }
    }

    let mut answers = Vec::with_capacity(ancount as usize);
    for _ in 0..ancount {
        let (_, next) = read_name(msg, pos)?;
        let rtype = read_u16(msg, next)?;
        let rdlen = read_u16(msg, next + 8)? as usize;
        let rdata_pos = next + 10;
        let rdata = msg
            .get(rdata_pos..rdata_pos + rdlen)
            .ok_or(CodecError::Truncated(rdata_pos))?;
        answers.push(parse_answer(msg, rtype, rdata_pos, rdata)?);
        pos = rdata_pos + rdlen;
    }

    Ok(DnsReply { id, rcode, name, answers })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// 按查询帧构造对应的响应帧（交换地址和端口）
    pub(crate) fn build_response_frame(query_frame: &[u8], answers: &[Ipv4Addr], rcode: u8) -> Vec<u8> {
        let ethernet = EthernetPacket::new(query_frame).unwrap();
        let ip = Ipv4Packet::new(ethernet.payload()).unwrap();
        let udp = UdpPacket::new(ip.payload()).unwrap();
        let query = udp.payload();

        let mut msg = Vec::new();
        msg.extend_from_slice(&query[0..2]);
        msg.push(0x81);
        msg.push(0x80 | (rcode & 0x0F));
        msg.extend_from_slice(&[0x00, 0x01]);
        msg.extend_from_slice(&(answers.len() as u16).to_be_bytes());
        msg.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        msg.extend_from_slice(&query[DNS_HEADER_LEN..]);
        for addr in answers {
            msg.extend_from_slice(&[0xC0, 0x0C]);
            msg.extend_from_slice(&TYPE_A.to_be_bytes());
            msg.extend_from_slice(&CLASS_IN.to_be_bytes());
            msg.extend_from_slice(&300u32.to_be_bytes());
            msg.extend_from_slice(&4u16.to_be_bytes());
            msg.extend_from_slice(&addr.octets());
        }

        let reply_link = EthTable {
            src_ip: ip.get_destination(),
            device: "mock".to_string(),
            src_mac: ethernet.get_destination(),
            dst_mac: ethernet.get_source(),
        };
        build_udp_frame(&reply_link, DNS_PORT, ip.get_source(), udp.get_source(), &msg).unwrap()
    }

    pub(crate) fn query_name(query_frame: &[u8]) -> String {
        let ethernet = EthernetPacket::new(query_frame).unwrap();
        let ip = Ipv4Packet::new(ethernet.payload()).unwrap();
        let udp = UdpPacket::new(ip.payload()).unwrap();
        read_name(udp.payload(), DNS_HEADER_LEN).unwrap().0
    }

    pub(crate) fn test_link() -> EthTable {
        EthTable {
            src_ip: Ipv4Addr::new(192, 168, 1, 10),
            device: "mock0".to_string(),
            src_mac: pnet::datalink::MacAddr::new(0x02, 0, 0, 0, 0, 0x01),
            dst_mac: pnet::datalink::MacAddr::new(0x02, 0, 0, 0, 0, 0xfe),
        }
    }
}
