//! Disk image formats
//!
//! イメージファイル（dsk/do/po/d13/nib/2mg/woz）とトラック列の相互変換。
//! セクタイメージはロード時にニブル化し、保存時にデコードして元の並びに戻す。

use crate::nibble::{self, BYTES_PER_SECTOR};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// トラック数
pub const TRACKS: usize = 35;
/// デフォルトのボリューム番号
pub const DEFAULT_VOLUME: u8 = 254;
/// NIBイメージの1トラックのバイト数
pub const NIB_TRACK_SIZE: usize = 6656;
/// 16セクタイメージのサイズ (143360)
pub const DSK_SIZE: usize = TRACKS * 16 * BYTES_PER_SECTOR;
/// 13セクタイメージのサイズ (116480)
pub const D13_SIZE: usize = TRACKS * 13 * BYTES_PER_SECTOR;
/// NIBイメージのサイズ (232960)
pub const NIB_SIZE: usize = TRACKS * NIB_TRACK_SIZE;

/// 物理セクタ→DOS 3.3 論理セクタ
const DOS_ORDER: [usize; 16] = [0, 7, 14, 6, 13, 5, 12, 4, 11, 3, 10, 2, 9, 1, 8, 15];
/// 物理セクタ→ProDOSブロック内セクタ
const PRODOS_ORDER: [usize; 16] = [0, 8, 1, 9, 2, 10, 3, 11, 4, 12, 5, 13, 6, 14, 7, 15];
/// 物理セクタ→DOS 3.2 イメージ内セクタ
const D13_ORDER: [usize; 13] = [0, 4, 8, 12, 3, 7, 11, 2, 6, 10, 1, 5, 9];

const TWO_IMG_MAGIC: &[u8; 4] = b"2IMG";
const TWO_IMG_HEADER_LEN: usize = 64;

const WOZ_TRACK_MAP_LEN: usize = 160;
const WOZ1_TRACK_LEN: usize = 6656;

/// ディスクイメージ形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    #[serde(rename = "2mg")]
    TwoImg,
    D13,
    Do,
    Dsk,
    Nib,
    Po,
    Woz,
}

impl DiskFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DiskFormat::TwoImg => "2mg",
            DiskFormat::D13 => "d13",
            DiskFormat::Do => "do",
            DiskFormat::Dsk => "dsk",
            DiskFormat::Nib => "nib",
            DiskFormat::Po => "po",
            DiskFormat::Woz => "woz",
        }
    }

    /// ファイル名の拡張子から推定
    pub fn from_path(path: &str) -> Result<Self, DiskError> {
        let ext = path.rsplit('.').next().unwrap_or_default();
        ext.to_ascii_lowercase().parse()
    }

    /// 物理セクタ→イメージ内セクタの対応表（セクタ形式のみ）
    fn sector_order(self) -> Option<&'static [usize]> {
        match self {
            DiskFormat::Do | DiskFormat::Dsk => Some(&DOS_ORDER),
            DiskFormat::Po => Some(&PRODOS_ORDER),
            DiskFormat::D13 => Some(&D13_ORDER),
            _ => None,
        }
    }
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskFormat {
    type Err = DiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2mg" => Ok(DiskFormat::TwoImg),
            "d13" => Ok(DiskFormat::D13),
            "do" => Ok(DiskFormat::Do),
            "dsk" => Ok(DiskFormat::Dsk),
            "nib" => Ok(DiskFormat::Nib),
            "po" => Ok(DiskFormat::Po),
            "woz" => Ok(DiskFormat::Woz),
            _ => Err(DiskError::UnknownFormat(s.to_string())),
        }
    }
}

/// ディスク操作のエラー
#[derive(Debug, Clone, PartialEq)]
pub enum DiskError {
    UnknownFormat(String),
    BadSize { format: DiskFormat, len: usize },
    BadHeader(&'static str),
    Encoding(String),
    NoDrive(usize),
    NoDisk,
    ReadOnly,
    SectorNotFound { track: u8, sector: u8 },
    BadBootRom(&'static str),
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::UnknownFormat(tag) => write!(f, "unknown disk format '{}'", tag),
            DiskError::BadSize { format, len } => {
                write!(f, "invalid {} image size: {} bytes", format, len)
            }
            DiskError::BadHeader(what) => write!(f, "invalid image header: {}", what),
            DiskError::Encoding(msg) => write!(f, "invalid image encoding: {}", msg),
            DiskError::NoDrive(drive) => write!(f, "no such drive: {}", drive),
            DiskError::NoDisk => write!(f, "no disk in drive"),
            DiskError::ReadOnly => write!(f, "disk is read-only"),
            DiskError::SectorNotFound { track, sector } => {
                write!(f, "sector not found: track {} sector {}", track, sector)
            }
            DiskError::BadBootRom(what) => write!(f, "invalid boot ROM: {}", what),
        }
    }
}

impl std::error::Error for DiskError {}

/// 2mgコンテナの情報（保存時に同じヘッダで包み直す）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoImgWrapper {
    /// 中身の形式 (do / po / nib)
    pub inner: DiskFormat,
    /// データ前のヘッダ部分
    pub header: Vec<u8>,
    /// データ後ろのコメント等
    pub trailer: Vec<u8>,
}

/// ドライブに挿入できる形に展開したディスク
#[derive(Debug, Clone, PartialEq)]
pub struct TrackImage {
    pub format: DiskFormat,
    pub volume: u8,
    /// ニブル列、またはビット列（1要素1ビット）
    pub tracks: Vec<Vec<u8>>,
    /// `tracks` がビット列か (woz)
    pub raw: bool,
    /// クォータートラック→トラック番号 (woz, 0xFF は空)
    pub track_map: Vec<u8>,
    pub read_only: bool,
    pub wrapper: Option<TwoImgWrapper>,
}

impl TrackImage {
    fn sectors(format: DiskFormat, volume: u8, data: &[u8]) -> Self {
        let (order, encoding_13) = match format {
            DiskFormat::D13 => (&D13_ORDER[..], true),
            DiskFormat::Po => (&PRODOS_ORDER[..], false),
            _ => (&DOS_ORDER[..], false),
        };
        let per_track = order.len();
        let tracks = (0..TRACKS)
            .map(|t| {
                let mut track = Vec::new();
                for (physical, &logical) in order.iter().enumerate() {
                    let offset = (t * per_track + logical) * BYTES_PER_SECTOR;
                    let mut sector = [0u8; BYTES_PER_SECTOR];
                    sector.copy_from_slice(&data[offset..offset + BYTES_PER_SECTOR]);
                    let bytes = if encoding_13 {
                        nibble::explode_sector13(volume, t as u8, physical as u8, &sector)
                    } else {
                        nibble::explode_sector16(volume, t as u8, physical as u8, &sector)
                    };
                    track.extend(bytes);
                }
                track
            })
            .collect();
        TrackImage {
            format,
            volume,
            tracks,
            raw: false,
            track_map: Vec::new(),
            read_only: false,
            wrapper: None,
        }
    }

    fn nibbles(data: &[u8]) -> Self {
        TrackImage {
            format: DiskFormat::Nib,
            volume: DEFAULT_VOLUME,
            tracks: data.chunks(NIB_TRACK_SIZE).map(|c| c.to_vec()).collect(),
            raw: false,
            track_map: Vec::new(),
            read_only: false,
            wrapper: None,
        }
    }

    /// トラック数（クォータートラック換算の上限に使う）
    pub fn track_count(&self) -> usize {
        if self.raw {
            self.track_map.len() / 4
        } else {
            self.tracks.len()
        }
    }

    /// ニブル列としてのトラック（woz はビット列から再構成）
    pub fn nibble_track(&self, track: usize) -> Option<std::borrow::Cow<'_, [u8]>> {
        if self.raw {
            let idx = *self.track_map.get(track * 4)?;
            let bits = self.tracks.get(idx as usize)?;
            Some(std::borrow::Cow::Owned(bits_to_nibbles(bits)))
        } else {
            self.tracks.get(track).map(|t| std::borrow::Cow::Borrowed(&t[..]))
        }
    }
}

/// イメージファイルを展開
pub fn decode_image(format: DiskFormat, data: &[u8]) -> Result<TrackImage, DiskError> {
    let bad_size = || DiskError::BadSize {
        format,
        len: data.len(),
    };
    match format {
        DiskFormat::Do | DiskFormat::Dsk | DiskFormat::Po => {
            if data.len() != DSK_SIZE {
                return Err(bad_size());
            }
            Ok(TrackImage::sectors(format, DEFAULT_VOLUME, data))
        }
        DiskFormat::D13 => {
            if data.len() != D13_SIZE {
                return Err(bad_size());
            }
            Ok(TrackImage::sectors(format, DEFAULT_VOLUME, data))
        }
        DiskFormat::Nib => {
            if data.len() != NIB_SIZE {
                return Err(bad_size());
            }
            Ok(TrackImage::nibbles(data))
        }
        DiskFormat::TwoImg => decode_2mg(data),
        DiskFormat::Woz => decode_woz(data),
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode_2mg(data: &[u8]) -> Result<TrackImage, DiskError> {
    if data.len() < TWO_IMG_HEADER_LEN || &data[0..4] != TWO_IMG_MAGIC {
        return Err(DiskError::BadHeader("missing 2IMG signature"));
    }
    let header_field = |offset| read_u32(data, offset).ok_or(DiskError::BadHeader("truncated"));
    let inner = match header_field(12)? {
        0 => DiskFormat::Do,
        1 => DiskFormat::Po,
        2 => DiskFormat::Nib,
        _ => return Err(DiskError::BadHeader("unknown 2IMG image format")),
    };
    let flags = header_field(16)?;
    let offset = header_field(24)? as usize;
    let len = header_field(28)? as usize;
    let payload = data
        .get(offset..offset + len)
        .ok_or(DiskError::BadHeader("data outside file"))?;

    let mut image = decode_image(inner, payload)?;
    if flags & 0x100 != 0 {
        image.volume = (flags & 0xFF) as u8;
        if inner != DiskFormat::Nib {
            image = TrackImage::sectors(inner, image.volume, payload);
        }
    }
    image.read_only = flags & 0x8000_0000 != 0;
    image.format = DiskFormat::TwoImg;
    image.wrapper = Some(TwoImgWrapper {
        inner,
        header: data[..offset].to_vec(),
        trailer: data[offset + len..].to_vec(),
    });
    log::debug!("2mg: inner={} volume={} read_only={}", inner, image.volume, image.read_only);
    Ok(image)
}

/// MSBファーストのバイト列をビット列に
fn unpack_bits(bytes: &[u8], bit_count: usize) -> Vec<u8> {
    (0..bit_count.min(bytes.len() * 8))
        .map(|i| (bytes[i >> 3] >> (7 - (i & 7))) & 1)
        .collect()
}

fn decode_woz(data: &[u8]) -> Result<TrackImage, DiskError> {
    let version = match data.get(0..4) {
        Some(b"WOZ1") => 1,
        Some(b"WOZ2") => 2,
        _ => return Err(DiskError::BadHeader("missing WOZ signature")),
    };
    if data.get(4..8) != Some(&[0xFF, 0x0A, 0x0D, 0x0A][..]) {
        return Err(DiskError::BadHeader("corrupt WOZ header"));
    }

    let mut read_only = false;
    let mut track_map = Vec::new();
    let mut trks: Option<(usize, usize)> = None;

    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let size = read_u32(data, pos + 4).unwrap_or(0) as usize;
        let start = pos + 8;
        let end = (start + size).min(data.len());
        match id {
            b"INFO" => read_only = data.get(start + 2).copied().unwrap_or(0) == 1,
            b"TMAP" => {
                track_map = data
                    .get(start..start + WOZ_TRACK_MAP_LEN)
                    .ok_or(DiskError::BadHeader("truncated TMAP"))?
                    .to_vec()
            }
            b"TRKS" => trks = Some((start, end)),
            _ => {}
        }
        pos = start + size;
    }

    let (trks_start, trks_end) = trks.ok_or(DiskError::BadHeader("missing TRKS chunk"))?;
    if track_map.is_empty() {
        return Err(DiskError::BadHeader("missing TMAP chunk"));
    }

    let mut tracks = Vec::new();
    if version == 1 {
        let mut offset = trks_start;
        while offset + WOZ1_TRACK_LEN <= trks_end {
            let entry = &data[offset..offset + WOZ1_TRACK_LEN];
            let bit_count = read_u16(entry, 6648).unwrap_or(0) as usize;
            tracks.push(unpack_bits(&entry[..6646], bit_count));
            offset += WOZ1_TRACK_LEN;
        }
    } else {
        for i in 0..WOZ_TRACK_MAP_LEN {
            let entry = trks_start + i * 8;
            let (Some(block), Some(blocks), Some(bits)) = (
                read_u16(data, entry),
                read_u16(data, entry + 2),
                read_u32(data, entry + 4),
            ) else {
                break;
            };
            if block == 0 {
                break;
            }
            let start = block as usize * 512;
            let bytes = data
                .get(start..start + blocks as usize * 512)
                .ok_or(DiskError::BadHeader("track data outside file"))?;
            tracks.push(unpack_bits(bytes, bits as usize));
        }
    }

    // 存在しないトラックを指すエントリは空扱い
    for entry in track_map.iter_mut() {
        if *entry as usize >= tracks.len() {
            *entry = 0xFF;
        }
    }
    log::debug!("woz{}: {} tracks read_only={}", version, tracks.len(), read_only);

    Ok(TrackImage {
        format: DiskFormat::Woz,
        volume: DEFAULT_VOLUME,
        tracks,
        raw: true,
        track_map,
        read_only,
        wrapper: None,
    })
}

/// ビット列をシフトレジスタに通してニブル列にする
pub fn bits_to_nibbles(bits: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bits.len() / 8);
    let mut shift = 0u8;
    for &bit in bits {
        shift = (shift << 1) | (bit & 1);
        if shift & 0x80 != 0 {
            nibbles.push(shift);
            shift = 0;
        }
    }
    nibbles
}

/// 展開済みディスクをイメージファイルの並びに戻す
pub fn encode_image(image: &TrackImage) -> Result<Vec<u8>, DiskError> {
    if image.raw {
        return Err(DiskError::ReadOnly);
    }
    match image.format {
        DiskFormat::TwoImg => {
            let wrapper = image
                .wrapper
                .as_ref()
                .ok_or(DiskError::BadHeader("2mg without header"))?;
            let mut out = wrapper.header.clone();
            out.extend(encode_tracks(wrapper.inner, image)?);
            out.extend_from_slice(&wrapper.trailer);
            Ok(out)
        }
        format => encode_tracks(format, image),
    }
}

fn encode_tracks(format: DiskFormat, image: &TrackImage) -> Result<Vec<u8>, DiskError> {
    let Some(order) = format.sector_order() else {
        // nib: トラックをそのまま連結
        return Ok(image.tracks.concat());
    };
    let per_track = order.len();
    let mut out = vec![0u8; TRACKS * per_track * BYTES_PER_SECTOR];
    for (t, track) in image.tracks.iter().enumerate().take(TRACKS) {
        for (physical, &logical) in order.iter().enumerate() {
            let offset = (t * per_track + logical) * BYTES_PER_SECTOR;
            match nibble::read_sector(track, t as u8, physical as u8) {
                Some(sector) => {
                    out[offset..offset + BYTES_PER_SECTOR].copy_from_slice(&sector.data)
                }
                None => log::warn!("encode: unreadable sector t={} s={}", t, physical),
            }
        }
    }
    Ok(out)
}

/// 物理セクタ番号をイメージ内のセクタ番号に変換
pub fn logical_sector(format: DiskFormat, physical: usize) -> Option<usize> {
    format.sector_order()?.get(physical).copied()
}

/// 物理セクタ番号を論理セクタ番号から求める
pub fn physical_sector(format: DiskFormat, logical: usize) -> Option<usize> {
    format.sector_order()?.iter().position(|&l| l == logical)
}

/// JSON形式のディスクイメージ
///
/// `data` はトラック毎のセクタ（base64）の並び。NIBならトラック毎に1要素。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskImage {
    #[serde(rename = "type")]
    pub format: DiskFormat,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub volume: Option<u8>,
    #[serde(default, rename = "readOnly")]
    pub read_only: bool,
    pub data: Vec<Vec<String>>,
}

impl DiskImage {
    /// 生のイメージバイト列に連結
    pub fn to_binary(&self) -> Result<Vec<u8>, DiskError> {
        let mut out = Vec::new();
        for track in &self.data {
            for sector in track {
                let bytes = BASE64
                    .decode(sector)
                    .map_err(|e| DiskError::Encoding(e.to_string()))?;
                out.extend(bytes);
            }
        }
        Ok(out)
    }

    /// 展開済みディスクに変換
    pub fn decode(&self) -> Result<TrackImage, DiskError> {
        if matches!(self.format, DiskFormat::TwoImg | DiskFormat::Woz) {
            return Err(DiskError::UnknownFormat(format!("json {}", self.format)));
        }
        let binary = self.to_binary()?;
        let mut image = decode_image(self.format, &binary)?;
        if let Some(volume) = self.volume {
            if image.format != DiskFormat::Nib {
                image = TrackImage::sectors(image.format, volume, &binary);
            }
        }
        image.read_only = self.read_only;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsk_pattern() -> Vec<u8> {
        (0..DSK_SIZE).map(|i| (i / 256 + i) as u8).collect()
    }

    #[test]
    fn test_format_tags() {
        for tag in ["2mg", "d13", "do", "dsk", "nib", "po", "woz"] {
            let format: DiskFormat = tag.parse().unwrap();
            assert_eq!(format.as_str(), tag);
        }
        assert!(matches!("img".parse::<DiskFormat>(), Err(DiskError::UnknownFormat(_))));
        assert_eq!(DiskFormat::from_path("Games/ZORK.DSK").unwrap(), DiskFormat::Dsk);
    }

    #[test]
    fn test_sector_orders_are_permutations() {
        for order in [&DOS_ORDER[..], &PRODOS_ORDER[..], &D13_ORDER[..]] {
            let mut seen = order.to_vec();
            seen.sort_unstable();
            assert_eq!(seen, (0..order.len()).collect::<Vec<_>>());
        }
        assert_eq!(logical_sector(DiskFormat::Dsk, 1), Some(7));
        assert_eq!(physical_sector(DiskFormat::Dsk, 7), Some(1));
        assert_eq!(logical_sector(DiskFormat::Nib, 1), None);
    }

    #[test]
    fn test_dsk_roundtrip() {
        let data = dsk_pattern();
        let image = decode_image(DiskFormat::Dsk, &data).unwrap();
        assert_eq!(image.tracks.len(), TRACKS);
        assert_eq!(encode_image(&image).unwrap(), data);
    }

    #[test]
    fn test_po_and_d13_roundtrip() {
        let data = dsk_pattern();
        let image = decode_image(DiskFormat::Po, &data).unwrap();
        assert_eq!(encode_image(&image).unwrap(), data);

        let d13: Vec<u8> = (0..D13_SIZE).map(|i| (i * 7 / 256) as u8).collect();
        let image = decode_image(DiskFormat::D13, &d13).unwrap();
        assert_eq!(encode_image(&image).unwrap(), d13);
    }

    #[test]
    fn test_physical_sector_placement() {
        let mut data = vec![0u8; DSK_SIZE];
        // トラック1の論理セクタ7
        let offset = (16 + 7) * 256;
        data[offset..offset + 256].fill(0x77);
        let image = decode_image(DiskFormat::Dsk, &data).unwrap();
        let sector = nibble::read_sector(&image.tracks[1], 1, 1).unwrap();
        assert_eq!(sector.data, [0x77; 256]);
    }

    #[test]
    fn test_bad_sizes_rejected() {
        assert!(matches!(
            decode_image(DiskFormat::Dsk, &[0u8; 100]),
            Err(DiskError::BadSize { len: 100, .. })
        ));
        assert!(decode_image(DiskFormat::Nib, &[0u8; DSK_SIZE]).is_err());
        assert!(decode_image(DiskFormat::TwoImg, &[0u8; 80]).is_err());
        assert!(decode_image(DiskFormat::Woz, b"WOZ2").is_err());
    }

    #[test]
    fn test_nib_roundtrip() {
        let data: Vec<u8> = (0..NIB_SIZE).map(|i| 0x96 | (i as u8 & 0x01)).collect();
        let image = decode_image(DiskFormat::Nib, &data).unwrap();
        assert_eq!(image.tracks[0].len(), NIB_TRACK_SIZE);
        assert_eq!(encode_image(&image).unwrap(), data);
    }

    #[test]
    fn test_2mg_roundtrip() {
        let payload = dsk_pattern();
        let mut file = vec![0u8; TWO_IMG_HEADER_LEN];
        file[0..4].copy_from_slice(TWO_IMG_MAGIC);
        file[12..16].copy_from_slice(&1u32.to_le_bytes());
        file[16..20].copy_from_slice(&(0x100u32 | 17).to_le_bytes());
        file[24..28].copy_from_slice(&(TWO_IMG_HEADER_LEN as u32).to_le_bytes());
        file[28..32].copy_from_slice(&(DSK_SIZE as u32).to_le_bytes());
        file.extend_from_slice(&payload);
        file.extend_from_slice(b"comment");

        let image = decode_image(DiskFormat::TwoImg, &file).unwrap();
        assert_eq!(image.volume, 17);
        assert_eq!(image.wrapper.as_ref().unwrap().inner, DiskFormat::Po);
        assert_eq!(nibble::read_sector(&image.tracks[0], 0, 0).unwrap().volume, 17);
        assert_eq!(encode_image(&image).unwrap(), file);
    }

    fn woz2_file(bits: &[u8]) -> Vec<u8> {
        let mut file = b"WOZ2\xFF\x0A\x0D\x0A\0\0\0\0".to_vec();
        file.extend_from_slice(b"INFO");
        file.extend_from_slice(&60u32.to_le_bytes());
        let mut info = vec![0u8; 60];
        info[0] = 2;
        info[2] = 1;
        file.extend(info);
        file.extend_from_slice(b"TMAP");
        file.extend_from_slice(&160u32.to_le_bytes());
        let mut tmap = vec![0xFFu8; 160];
        tmap[0] = 0;
        tmap[1] = 0;
        file.extend(tmap);
        file.extend_from_slice(b"TRKS");
        file.extend_from_slice(&(1280u32 + 512).to_le_bytes());
        let mut entries = vec![0u8; 1280];
        entries[0..2].copy_from_slice(&3u16.to_le_bytes());
        entries[2..4].copy_from_slice(&1u16.to_le_bytes());
        entries[4..8].copy_from_slice(&((bits.len() * 8) as u32).to_le_bytes());
        file.extend(entries);
        assert!(file.len() <= 3 * 512);
        file.resize(3 * 512, 0);
        let mut block = bits.to_vec();
        block.resize(512, 0);
        file.extend(block);
        file
    }

    #[test]
    fn test_woz2_tracks() {
        let file = woz2_file(&[0xD5, 0xAA, 0x96, 0xFF]);
        let image = decode_image(DiskFormat::Woz, &file).unwrap();
        assert!(image.raw);
        assert!(image.read_only);
        assert_eq!(image.tracks.len(), 1);
        assert_eq!(image.tracks[0].len(), 32);
        assert_eq!(&image.tracks[0][..8], &[1, 1, 0, 1, 0, 1, 0, 1]);
        assert_eq!(image.track_map[1], 0);
        assert_eq!(image.track_map[2], 0xFF);
        assert_eq!(image.nibble_track(0).unwrap().as_ref(), &[0xD5, 0xAA, 0x96, 0xFF]);
        assert_eq!(encode_image(&image), Err(DiskError::ReadOnly));
    }

    #[test]
    fn test_bits_to_nibbles_skips_sync_zeros() {
        // FF 00(2ビット) D5
        let bits = [1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 1, 1, 0, 1, 0, 1, 0, 1];
        assert_eq!(bits_to_nibbles(&bits), vec![0xFF, 0xD5]);
    }

    #[test]
    fn test_json_image() {
        let data = dsk_pattern();
        let json = DiskImage {
            format: DiskFormat::Dsk,
            name: "test".into(),
            volume: Some(10),
            read_only: true,
            data: data
                .chunks(16 * 256)
                .map(|t| t.chunks(256).map(|s| BASE64.encode(s)).collect())
                .collect(),
        };
        let image = json.decode().unwrap();
        assert!(image.read_only);
        assert_eq!(image.volume, 10);
        assert_eq!(encode_image(&image).unwrap(), data);

        let text = serde_json::to_string(&json).unwrap();
        assert!(text.contains("\"type\":\"dsk\""));
        assert!(text.contains("\"readOnly\":true"));
    }
}
