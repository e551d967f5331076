//! GCR nibble codec
//!
//! セクタデータ（256バイト）とディスク上のニブル列の相互変換。
//! 16セクタは6-and-2、13セクタは5-and-3、アドレスフィールドは4-and-4。
//! Based on "Beneath Apple DOS" chapter 3

/// セクタのバイト数
pub const BYTES_PER_SECTOR: usize = 256;

/// アドレスフィールドのプロローグ3バイト目
pub const ADDRESS_PROLOGUE_16: u8 = 0x96;
pub const ADDRESS_PROLOGUE_13: u8 = 0xB5;
/// データフィールドのプロローグ3バイト目
pub const DATA_PROLOGUE: u8 = 0xAD;

const EPILOGUE: [u8; 3] = [0xDE, 0xAA, 0xEB];

/// 6-and-2 で符号化したデータフィールドのバイト数（342＋チェックサム）
pub const DATA_FIELD_62: usize = 343;
/// 5-and-3 で符号化したデータフィールドのバイト数（410＋チェックサム）
pub const DATA_FIELD_53: usize = 411;

/// 6-and-2 変換テーブル
const WRITE_TABLE_62: [u8; 64] = [
    0x96, 0x97, 0x9A, 0x9B, 0x9D, 0x9E, 0x9F, 0xA6,
    0xA7, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB2, 0xB3,
    0xB4, 0xB5, 0xB6, 0xB7, 0xB9, 0xBA, 0xBB, 0xBC,
    0xBD, 0xBE, 0xBF, 0xCB, 0xCD, 0xCE, 0xCF, 0xD3,
    0xD6, 0xD7, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
    0xDF, 0xE5, 0xE6, 0xE7, 0xE9, 0xEA, 0xEB, 0xEC,
    0xED, 0xEE, 0xEF, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6,
    0xF7, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

/// 5-and-3 変換テーブル
const WRITE_TABLE_53: [u8; 32] = [
    0xAB, 0xAD, 0xAE, 0xAF, 0xB5, 0xB6, 0xB7, 0xBA,
    0xBB, 0xBD, 0xBE, 0xBF, 0xD6, 0xD7, 0xDA, 0xDB,
    0xDD, 0xDE, 0xDF, 0xEA, 0xEB, 0xED, 0xEE, 0xEF,
    0xF5, 0xF6, 0xF7, 0xFA, 0xFB, 0xFD, 0xFE, 0xFF,
];

/// 逆変換テーブルに入らない値
const INVALID: u8 = 0xFF;

const fn invert<const N: usize>(table: &[u8; N]) -> [u8; 256] {
    let mut inv = [INVALID; 256];
    let mut i = 0;
    while i < N {
        inv[table[i] as usize] = i as u8;
        i += 1;
    }
    inv
}

const READ_TABLE_62: [u8; 256] = invert(&WRITE_TABLE_62);
const READ_TABLE_53: [u8; 256] = invert(&WRITE_TABLE_53);

/// セクタの符号化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// 16セクタ (DOS 3.3 / ProDOS)
    SixAndTwo,
    /// 13セクタ (DOS 3.2)
    FiveAndThree,
}

impl Encoding {
    fn from_prologue(byte: u8) -> Option<Self> {
        match byte {
            ADDRESS_PROLOGUE_16 => Some(Encoding::SixAndTwo),
            ADDRESS_PROLOGUE_13 => Some(Encoding::FiveAndThree),
            _ => None,
        }
    }

    /// データフィールド（プロローグ・エピローグ除く）の長さ
    pub fn data_field_len(self) -> usize {
        match self {
            Encoding::SixAndTwo => DATA_FIELD_62,
            Encoding::FiveAndThree => DATA_FIELD_53,
        }
    }
}

/// 4-and-4 エンコード
pub fn four_and_four(b: u8) -> [u8; 2] {
    [((b & 0xAA) >> 1) | 0xAA, (b & 0x55) | 0xAA]
}

/// 4-and-4 デコード
pub fn defour_and_four(xx: u8, yy: u8) -> u8 {
    ((xx << 1) | 0x01) & yy
}

/// 256バイトを342個の6ビット値へ
///
/// 先頭86個は各バイトの下位2ビット（ビット順を入れ替えて3バイト分を詰める）、
/// 続く256個は上位6ビット。
fn prenibble_62(data: &[u8; BYTES_PER_SECTOR]) -> [u8; 342] {
    let mut nibbles = [0u8; 342];
    for i in 0..86 {
        let mut aux = 0u8;
        for j in (0..3).rev() {
            // 256, 257 は data[0], data[1] に折り返す
            let b = data[(i + 86 * j) % 256];
            aux = (aux << 2) | ((b & 0x01) << 1) | ((b >> 1) & 0x01);
        }
        nibbles[i] = aux;
    }
    for (i, b) in data.iter().enumerate() {
        nibbles[86 + i] = b >> 2;
    }
    nibbles
}

/// 256バイトを410個の5ビット値へ
///
/// 0x000..0x100 が上位5ビット、0x100..0x19A が下位3ビットを5バイト単位で組み替えたもの。
fn prenibble_53(data: &[u8; BYTES_PER_SECTOR]) -> [u8; 410] {
    let mut nibbles = [0u8; 410];
    let mut src = 0;
    for idx in (0..0x33).rev() {
        let (a, b, c, d, e) = (data[src], data[src + 1], data[src + 2], data[src + 3], data[src + 4]);
        src += 5;
        nibbles[idx] = a >> 3;
        nibbles[idx + 0x33] = b >> 3;
        nibbles[idx + 0x66] = c >> 3;
        nibbles[idx + 0x99] = d >> 3;
        nibbles[idx + 0xCC] = e >> 3;
        let (d3, e3) = (d & 0x07, e & 0x07);
        nibbles[idx + 0x100] = (a & 0x07) << 2 | (d3 & 0x04) >> 1 | (e3 & 0x04) >> 2;
        nibbles[idx + 0x133] = (b & 0x07) << 2 | (d3 & 0x02) | (e3 & 0x02) >> 1;
        nibbles[idx + 0x166] = (c & 0x07) << 2 | (d3 & 0x01) << 1 | (e3 & 0x01);
    }
    nibbles[0xFF] = data[255] >> 3;
    nibbles[0x199] = data[255] & 0x07;
    nibbles
}

/// 前の値とのXORを取りながら変換テーブルを通し、最後にチェックサムを付ける
fn write_chain(out: &mut Vec<u8>, values: impl Iterator<Item = u8>, table: &[u8]) {
    let mut last = 0u8;
    for val in values {
        out.push(table[(last ^ val) as usize]);
        last = val;
    }
    out.push(table[last as usize]);
}

/// 1セクタ分のニブル列（ギャップ・アドレスフィールド・データフィールド）
fn explode_sector(
    volume: u8,
    track: u8,
    sector: u8,
    data: &[u8; BYTES_PER_SECTOR],
    encoding: Encoding,
) -> Vec<u8> {
    let gap = match (sector, track) {
        (0, _) => 0x80,
        (_, 0) => 0x28,
        _ => 0x26,
    };
    let mut buf = Vec::with_capacity(gap + 32 + encoding.data_field_len());
    buf.resize(gap, 0xFF);

    let prologue = match encoding {
        Encoding::SixAndTwo => ADDRESS_PROLOGUE_16,
        Encoding::FiveAndThree => ADDRESS_PROLOGUE_13,
    };
    buf.extend_from_slice(&[0xD5, 0xAA, prologue]);
    for value in [volume, track, sector, volume ^ track ^ sector] {
        buf.extend_from_slice(&four_and_four(value));
    }
    buf.extend_from_slice(&EPILOGUE);

    buf.extend_from_slice(&[0xFF; 5]);

    buf.extend_from_slice(&[0xD5, 0xAA, DATA_PROLOGUE]);
    match encoding {
        Encoding::SixAndTwo => {
            let nibbles = prenibble_62(data);
            write_chain(&mut buf, nibbles.iter().copied(), &WRITE_TABLE_62);
        }
        Encoding::FiveAndThree => {
            let nibbles = prenibble_53(data);
            // 下位3ビット側を逆順に先に書く
            let order = (0x100..0x19A).rev().chain(0..0x100);
            write_chain(&mut buf, order.map(|i| nibbles[i]), &WRITE_TABLE_53);
        }
    }
    buf.extend_from_slice(&EPILOGUE);

    buf.push(0xFF);
    buf
}

/// 16セクタ形式 (6-and-2) の1セクタ
pub fn explode_sector16(volume: u8, track: u8, sector: u8, data: &[u8; BYTES_PER_SECTOR]) -> Vec<u8> {
    explode_sector(volume, track, sector, data, Encoding::SixAndTwo)
}

/// 13セクタ形式 (5-and-3) の1セクタ
pub fn explode_sector13(volume: u8, track: u8, sector: u8, data: &[u8; BYTES_PER_SECTOR]) -> Vec<u8> {
    explode_sector(volume, track, sector, data, Encoding::FiveAndThree)
}

/// トラック上の位置を折り返しつつ読むカーソル
struct TrackReader<'a> {
    bytes: &'a [u8],
    idx: usize,
    wraps: u32,
}

impl<'a> TrackReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        TrackReader {
            bytes,
            idx: 0,
            wraps: 0,
        }
    }

    fn next(&mut self) -> u8 {
        let b = self.bytes[self.idx];
        self.idx += 1;
        if self.idx >= self.bytes.len() {
            self.idx = 0;
            self.wraps += 1;
        }
        b
    }

    fn skip(&mut self, count: usize) {
        self.idx += count;
        if self.idx >= self.bytes.len() {
            self.wraps += (self.idx / self.bytes.len()) as u32;
            self.idx %= self.bytes.len();
        }
    }
}

/// アドレスフィールドの内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    volume: u8,
    track: u8,
    sector: u8,
    encoding: Encoding,
}

/// `read_sector` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSector {
    pub volume: u8,
    pub track: u8,
    /// 物理セクタ番号
    pub sector: u8,
    pub encoding: Encoding,
    pub data: [u8; BYTES_PER_SECTOR],
}

/// トラック中のデータフィールドの位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorLocation {
    pub volume: u8,
    pub encoding: Encoding,
    /// データフィールドのプロローグ直後のオフセット
    pub data_offset: usize,
}

/// スキャナの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    SeekD5,
    SeekAA,
    Prologue,
    Address(Encoding),
    Data,
}

/// アドレスフィールドを読み、チェックサムが正しければ返す
fn read_header(reader: &mut TrackReader, encoding: Encoding) -> Option<Header> {
    let mut fields = [0u8; 4];
    for field in fields.iter_mut() {
        let xx = reader.next();
        let yy = reader.next();
        *field = defour_and_four(xx, yy);
    }
    let [volume, track, sector, checksum] = fields;
    reader.skip(EPILOGUE.len());
    if checksum != volume ^ track ^ sector {
        log::debug!(
            "nibble: bad header checksum v={:02X} t={:02X} s={:02X} c={:02X}",
            volume,
            track,
            sector,
            checksum
        );
        return None;
    }
    Some(Header {
        volume,
        track,
        sector,
        encoding,
    })
}

/// 5状態のスキャナで目的のセクタのデータフィールドを探す
///
/// 4周しても見つからなければ `None`。
fn scan<T>(
    bytes: &[u8],
    track: u8,
    sector: u8,
    mut on_data: impl FnMut(&mut TrackReader, Header) -> Option<T>,
) -> Option<T> {
    if bytes.is_empty() {
        return None;
    }
    let mut reader = TrackReader::new(bytes);
    let mut state = Scan::SeekD5;
    let mut header: Option<Header> = None;

    while reader.wraps < 4 {
        state = match state {
            Scan::SeekD5 => {
                if reader.next() == 0xD5 {
                    Scan::SeekAA
                } else {
                    Scan::SeekD5
                }
            }
            Scan::SeekAA => match reader.next() {
                0xAA => Scan::Prologue,
                0xD5 => Scan::SeekAA,
                _ => Scan::SeekD5,
            },
            Scan::Prologue => {
                let byte = reader.next();
                match Encoding::from_prologue(byte) {
                    Some(encoding) => Scan::Address(encoding),
                    None if byte == DATA_PROLOGUE => Scan::Data,
                    None => Scan::SeekD5,
                }
            }
            Scan::Address(encoding) => {
                header = read_header(&mut reader, encoding);
                Scan::SeekD5
            }
            Scan::Data => {
                match header.take() {
                    Some(h) if h.track == track && h.sector == sector => {
                        if let Some(result) = on_data(&mut reader, h) {
                            return Some(result);
                        }
                    }
                    Some(h) => reader.skip(h.encoding.data_field_len() + EPILOGUE.len()),
                    None => {}
                }
                Scan::SeekD5
            }
        };
    }
    None
}

/// 変換テーブルを通しXORチェーンを戻す。無効なニブルやチェックサム不一致は `None`
fn read_chain(reader: &mut TrackReader, out: &mut [u8], table: &[u8; 256]) -> Option<()> {
    let mut last = 0u8;
    for slot in out.iter_mut() {
        let x = table[reader.next() as usize];
        if x == INVALID {
            return None;
        }
        last ^= x;
        *slot = last;
    }
    let check = table[reader.next() as usize];
    if check == INVALID || check != last {
        return None;
    }
    Some(())
}

fn denibble_62(reader: &mut TrackReader) -> Option<[u8; BYTES_PER_SECTOR]> {
    let mut nibbles = [0u8; 342];
    read_chain(reader, &mut nibbles, &READ_TABLE_62)?;
    let mut data = [0u8; BYTES_PER_SECTOR];
    for (i, byte) in data.iter_mut().enumerate() {
        let pair = (nibbles[i % 86] >> (2 * (i / 86))) & 0x03;
        let low = ((pair & 0x01) << 1) | (pair >> 1);
        *byte = (nibbles[86 + i] << 2) | low;
    }
    Some(data)
}

fn denibble_53(reader: &mut TrackReader) -> Option<[u8; BYTES_PER_SECTOR]> {
    let mut stream = [0u8; 410];
    read_chain(reader, &mut stream, &READ_TABLE_53)?;
    // 書き込み順 (0x199..=0x100, 0x00..0x100) から元の並びへ
    let mut nibbles = [0u8; 410];
    for (k, value) in stream.iter().enumerate() {
        let idx = if k < 0x9A { 0x199 - k } else { k - 0x9A };
        nibbles[idx] = *value;
    }

    let mut data = [0u8; BYTES_PER_SECTOR];
    let mut dst = 0;
    for idx in (0..0x33).rev() {
        let (n0, n1, n2) = (nibbles[idx + 0x100], nibbles[idx + 0x133], nibbles[idx + 0x166]);
        let d3 = (n0 & 0x02) << 1 | (n1 & 0x02) | (n2 & 0x02) >> 1;
        let e3 = (n0 & 0x01) << 2 | (n1 & 0x01) << 1 | (n2 & 0x01);
        data[dst] = nibbles[idx] << 3 | n0 >> 2;
        data[dst + 1] = nibbles[idx + 0x33] << 3 | n1 >> 2;
        data[dst + 2] = nibbles[idx + 0x66] << 3 | n2 >> 2;
        data[dst + 3] = nibbles[idx + 0x99] << 3 | d3;
        data[dst + 4] = nibbles[idx + 0xCC] << 3 | e3;
        dst += 5;
    }
    data[255] = nibbles[0xFF] << 3 | nibbles[0x199];
    Some(data)
}

/// トラックのニブル列から物理セクタ `sector` を読む
///
/// アドレス・データ両方のチェックサムが一致した場合のみ返す。
pub fn read_sector(bytes: &[u8], track: u8, sector: u8) -> Option<DecodedSector> {
    scan(bytes, track, sector, |reader, header| {
        let data = match header.encoding {
            Encoding::SixAndTwo => denibble_62(reader),
            Encoding::FiveAndThree => denibble_53(reader),
        }?;
        Some(DecodedSector {
            volume: header.volume,
            track: header.track,
            sector: header.sector,
            encoding: header.encoding,
            data,
        })
    })
}

/// 物理セクタのデータフィールドの位置を探す（セクタ書き込み用）
pub fn locate_sector(bytes: &[u8], track: u8, sector: u8) -> Option<SectorLocation> {
    scan(bytes, track, sector, |reader, header| {
        Some(SectorLocation {
            volume: header.volume,
            encoding: header.encoding,
            data_offset: reader.idx,
        })
    })
}

/// データフィールドの符号化済みバイト列（チェックサム込み）
pub fn encode_data_field(data: &[u8; BYTES_PER_SECTOR], encoding: Encoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoding.data_field_len());
    match encoding {
        Encoding::SixAndTwo => {
            write_chain(&mut out, prenibble_62(data).iter().copied(), &WRITE_TABLE_62)
        }
        Encoding::FiveAndThree => {
            let nibbles = prenibble_53(data);
            let order = (0x100..0x19A).rev().chain(0..0x100);
            write_chain(&mut out, order.map(|i| nibbles[i]), &WRITE_TABLE_53);
        }
    }
    out
}

/// トラック上の物理セクタを書き換える。セクタが見つからなければ `false`
pub fn write_sector(bytes: &mut [u8], track: u8, sector: u8, data: &[u8; BYTES_PER_SECTOR]) -> bool {
    let Some(location) = locate_sector(bytes, track, sector) else {
        return false;
    };
    let encoded = encode_data_field(data, location.encoding);
    let len = bytes.len();
    for (i, b) in encoded.into_iter().enumerate() {
        bytes[(location.data_offset + i) % len] = b;
    }
    true
}
