//! Minimal jar (Zip32) reader: locate the central directory, look up an entry by name,
//! return its bytes. Only what mod discovery needs: stored and deflate entries.
//!
//! Sizes and offsets come from the file and are checked against its length before use.
//! Zip64, multi-disk archives and encrypted entries are rejected.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::DeflateDecoder;

const SIG_EOCD: u32 = 0x0605_4b50;
const SIG_CDFH: u32 = 0x0201_4b50;
const SIG_LFH: u32 = 0x0403_4b50;

const EOCD_MIN_LEN: usize = 22;
const EOCD_SEARCH_MAX: u64 = 66 * 1024; // 64 KiB comment + header margin
const CDFH_LEN: usize = 46;
const LFH_LEN: usize = 30;

/// Loader manifests are a few KiB; refuse to inflate anything past this.
pub const MAX_ENTRY_SIZE: u64 = 4 * 1024 * 1024;

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

struct CentralEntry {
    flags: u16,
    method: u16,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
}

/// An open jar with its central directory loaded.
pub struct JarReader {
    file: File,
    file_len: u64,
    central: Vec<u8>,
    entries: u16,
}

impl JarReader {
    pub fn open(path: &Path) -> Result<Self, String> {
        let mut file =
            File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
        let file_len = file
            .metadata()
            .map_err(|e| format!("Failed to stat {}: {}", path.display(), e))?
            .len();
        if file_len < EOCD_MIN_LEN as u64 {
            return Err("not a zip archive (too short)".to_string());
        }

        let win_len = file_len.min(EOCD_SEARCH_MAX);
        let mut win = vec![0u8; win_len as usize];
        file.seek(SeekFrom::Start(file_len - win_len))
            .and_then(|_| file.read_exact(&mut win))
            .map_err(|e| format!("Failed to read zip trailer: {}", e))?;

        let eocd_rel = find_eocd(&win).ok_or("not a zip archive (no end of central directory)")?;
        let eocd = &win[eocd_rel..];
        let disk_no = le_u16(&eocd[4..6]);
        let cd_disk = le_u16(&eocd[6..8]);
        let entries_disk = le_u16(&eocd[8..10]);
        let entries = le_u16(&eocd[10..12]);
        let cd_size = le_u32(&eocd[12..16]);
        let cd_off = le_u32(&eocd[16..20]);

        if disk_no != 0 || cd_disk != 0 || entries_disk != entries {
            return Err("multi-disk zip archives are not supported".to_string());
        }
        if entries == 0xFFFF || cd_size == 0xFFFF_FFFF || cd_off == 0xFFFF_FFFF {
            return Err("zip64 archives are not supported".to_string());
        }
        let cd_end = cd_off as u64 + cd_size as u64;
        if cd_end > file_len {
            return Err("central directory extends past end of file".to_string());
        }

        let mut central = vec![0u8; cd_size as usize];
        file.seek(SeekFrom::Start(cd_off as u64))
            .and_then(|_| file.read_exact(&mut central))
            .map_err(|e| format!("Failed to read central directory: {}", e))?;

        Ok(Self {
            file,
            file_len,
            central,
            entries,
        })
    }

    /// Bytes of entry `name`, or `None` when the jar has no such entry.
    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, String> {
        let mut found = None;
        self.walk(|entry_name, entry| {
            if entry_name == name.as_bytes() {
                found = Some(entry);
                true
            } else {
                false
            }
        })?;
        match found {
            Some(entry) => self.read_payload(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// Visit central-directory entries until `visit` returns true.
    fn walk<F>(&self, mut visit: F) -> Result<(), String>
    where
        F: FnMut(&[u8], CentralEntry) -> bool,
    {
        let cd = &self.central;
        let mut pos = 0usize;
        for _ in 0..self.entries {
            if pos + CDFH_LEN > cd.len() {
                return Err("truncated central directory".to_string());
            }
            let hdr = &cd[pos..pos + CDFH_LEN];
            if le_u32(&hdr[0..4]) != SIG_CDFH {
                return Err("bad central directory signature".to_string());
            }
            let name_len = le_u16(&hdr[28..30]) as usize;
            let extra_len = le_u16(&hdr[30..32]) as usize;
            let comment_len = le_u16(&hdr[32..34]) as usize;
            let name_start = pos + CDFH_LEN;
            if name_start + name_len > cd.len() {
                return Err("truncated central directory entry name".to_string());
            }
            let entry = CentralEntry {
                flags: le_u16(&hdr[8..10]),
                method: le_u16(&hdr[10..12]),
                compressed_size: le_u32(&hdr[20..24]) as u64,
                uncompressed_size: le_u32(&hdr[24..28]) as u64,
                local_header_offset: le_u32(&hdr[42..46]) as u64,
            };
            if visit(&cd[name_start..name_start + name_len], entry) {
                return Ok(());
            }
            pos = name_start + name_len + extra_len + comment_len;
        }
        Ok(())
    }

    fn read_payload(&mut self, entry: &CentralEntry) -> Result<Vec<u8>, String> {
        if entry.flags & 0x0001 != 0 {
            return Err("entry is encrypted".to_string());
        }
        if entry.uncompressed_size > MAX_ENTRY_SIZE {
            return Err(format!("entry too large ({} bytes)", entry.uncompressed_size));
        }

        let mut lfh = [0u8; LFH_LEN];
        self.file
            .seek(SeekFrom::Start(entry.local_header_offset))
            .and_then(|_| self.file.read_exact(&mut lfh))
            .map_err(|e| format!("Failed to read local header: {}", e))?;
        if le_u32(&lfh[0..4]) != SIG_LFH {
            return Err("bad local header signature".to_string());
        }
        let data_off = entry.local_header_offset
            + LFH_LEN as u64
            + le_u16(&lfh[26..28]) as u64
            + le_u16(&lfh[28..30]) as u64;
        if data_off + entry.compressed_size > self.file_len {
            return Err("entry data extends past end of file".to_string());
        }

        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.file
            .seek(SeekFrom::Start(data_off))
            .and_then(|_| self.file.read_exact(&mut raw))
            .map_err(|e| format!("Failed to read entry data: {}", e))?;

        match entry.method {
            0 => Ok(raw),
            8 => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(raw.as_slice())
                    .take(MAX_ENTRY_SIZE + 1)
                    .read_to_end(&mut out)
                    .map_err(|e| format!("Failed to inflate entry: {}", e))?;
                if out.len() as u64 > MAX_ENTRY_SIZE {
                    return Err("entry too large after inflating".to_string());
                }
                Ok(out)
            }
            m => Err(format!("unsupported compression method {}", m)),
        }
    }
}

/// Offset of the end-of-central-directory record within the trailer window, scanning
/// backwards and skipping candidates whose comment would run past the window.
fn find_eocd(win: &[u8]) -> Option<usize> {
    if win.len() < EOCD_MIN_LEN {
        return None;
    }
    (0..=win.len() - EOCD_MIN_LEN).rev().find(|&i| {
        le_u32(&win[i..i + 4]) == SIG_EOCD
            && i + EOCD_MIN_LEN + le_u16(&win[i + 20..i + 22]) as usize <= win.len()
    })
}

/// Build a zip in memory. Each entry is `(name, data, deflate)`.
#[cfg(test)]
pub(crate) fn build_test_jar(entries: &[(&str, &[u8], bool)]) -> Vec<u8> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, data, deflate) in entries {
        let payload = if *deflate {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
            enc.write_all(data).unwrap();
            enc.finish().unwrap()
        } else {
            data.to_vec()
        };
        let method: u16 = if *deflate { 8 } else { 0 };
        let offset = out.len() as u32;

        out.extend_from_slice(&SIG_LFH.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]); // time, date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc (not checked)
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        central.extend_from_slice(&SIG_CDFH.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&[0u8; 4]);
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 12]); // extra, comment, disk, attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }
    let cd_off = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&SIG_EOCD.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_off.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}
