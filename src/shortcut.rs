//! Windows shell-link (`.lnk`) fabrication behind a pluggable codec.

use std::io;
use std::path::{Path, PathBuf};

/// Serialises and deserialises link-like artifacts for the `create_lnkfile`
/// symlink policy. Implementations must round-trip the stored target.
pub trait ShortcutCodec: Send + Sync + std::fmt::Debug {
    /// Write a shortcut at `link_path` pointing at `target`.
    fn encode(&self, target: &Path, link_path: &Path) -> io::Result<()>;
    /// Read back the target stored in the shortcut at `link_path`.
    fn decode(&self, link_path: &Path) -> io::Result<PathBuf>;
}

const HEADER_SIZE: u32 = 0x4C;
const LINK_CLSID: [u8; 16] = [
    0x01, 0x14, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x46,
];
const FLAG_HAS_NAME: u32 = 0x04;
const FLAG_HAS_RELATIVE_PATH: u32 = 0x08;
const FLAG_IS_UNICODE: u32 = 0x80;
const SW_SHOWNORMAL: u32 = 1;

/// Minimal shell-link writer/reader: a bare ShellLinkHeader followed by the
/// RELATIVE_PATH string datum, always unicode. Enough for round-tripping the
/// target and for Explorer to resolve the shortcut.
#[derive(Debug, Default)]
pub struct LnkCodec;

impl ShortcutCodec for LnkCodec {
    fn encode(&self, target: &Path, link_path: &Path) -> io::Result<()> {
        let mut data = Vec::with_capacity(HEADER_SIZE as usize + 64);
        data.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        data.extend_from_slice(&LINK_CLSID);
        data.extend_from_slice(&(FLAG_HAS_RELATIVE_PATH | FLAG_IS_UNICODE).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // FileAttributes
        data.extend_from_slice(&[0u8; 24]); // Creation/Access/WriteTime
        data.extend_from_slice(&0u32.to_le_bytes()); // FileSize
        data.extend_from_slice(&0u32.to_le_bytes()); // IconIndex
        data.extend_from_slice(&SW_SHOWNORMAL.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes()); // HotKey
        data.extend_from_slice(&[0u8; 10]); // Reserved1..3

        let units: Vec<u16> = target.to_string_lossy().encode_utf16().collect();
        if units.len() > u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shortcut target too long",
            ));
        }
        data.extend_from_slice(&(units.len() as u16).to_le_bytes());
        for unit in units {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        std::fs::write(link_path, data)
    }

    fn decode(&self, link_path: &Path) -> io::Result<PathBuf> {
        let data = std::fs::read(link_path)?;
        let bad = |msg: &'static str| io::Error::new(io::ErrorKind::InvalidData, msg);

        if data.len() < HEADER_SIZE as usize {
            return Err(bad("shortcut shorter than its header"));
        }
        if read_u32(&data, 0) != HEADER_SIZE || data[4..20] != LINK_CLSID {
            return Err(bad("not a shell link"));
        }
        let flags = read_u32(&data, 20);
        if flags & FLAG_HAS_RELATIVE_PATH == 0 {
            return Err(bad("shortcut stores no path"));
        }

        let mut offset = HEADER_SIZE as usize;
        // A NAME_STRING datum precedes the path when present.
        if flags & FLAG_HAS_NAME != 0 {
            offset = skip_string(&data, offset, flags)?;
        }
        let count = u16::from_le_bytes(
            data.get(offset..offset + 2)
                .ok_or_else(|| bad("truncated string datum"))?
                .try_into()
                .unwrap(),
        ) as usize;
        offset += 2;

        if flags & FLAG_IS_UNICODE != 0 {
            let end = offset + count * 2;
            let raw = data.get(offset..end).ok_or_else(|| bad("truncated target"))?;
            let units: Vec<u16> =
                raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            Ok(PathBuf::from(String::from_utf16_lossy(&units)))
        } else {
            let raw = data
                .get(offset..offset + count)
                .ok_or_else(|| bad("truncated target"))?;
            Ok(PathBuf::from(String::from_utf8_lossy(raw).into_owned()))
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn skip_string(data: &[u8], offset: usize, flags: u32) -> io::Result<usize> {
    let count = data
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated string datum"))?;
    let width = if flags & FLAG_IS_UNICODE != 0 { 2 } else { 1 };
    Ok(offset + 2 + count * width)
}
