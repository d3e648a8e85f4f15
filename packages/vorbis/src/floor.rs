//! Floor configurations and spectral envelope synthesis.
//!
//! A floor is decoded from each audio packet per channel and rendered into a
//! curve of `n / 2` linear amplitudes that scales the residue spectrum.

use std::{f32::consts::PI, sync::LazyLock};

use log::trace;

use crate::{
    bitpack::{BitReader, EndOfPacket, ilog},
    codebook::Codebook,
    error::{Error, Result},
};

/// Number of partition classes a floor 1 may declare.
const FLOOR1_MAX_CLASSES: usize = 16;
/// Maximum number of X positions in a floor 1 (two implicit plus 63).
const FLOOR1_MAX_POSTS: usize = 65;

const FLOOR1_RANGES: [i32; 4] = [256, 128, 86, 64];

/// Floor 1 inverse-dB table, spanning -140 dB to 0 dB in 256 steps.
static INVERSE_DB_TABLE: LazyLock<[f32; 256]> = LazyLock::new(|| {
    const FIRST: f64 = 1.064_986_3e-7;
    let ratio = (1.0 / FIRST).powf(1.0 / 255.0);

    let mut table = [0.0_f32; 256];
    for (i, value) in table.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        {
            *value = (FIRST * ratio.powi(i as i32)) as f32;
        }
    }
    table
});

/// A floor configuration from the setup header.
#[derive(Debug, Clone)]
pub enum Floor {
    Zero(Floor0),
    One(Floor1),
}

/// Per-channel floor data decoded from an audio packet.
#[derive(Debug, Clone, PartialEq)]
pub enum FloorPacket {
    /// LSP coefficients and amplitude of a floor 0.
    Zero { amplitude: u32, coefficients: Vec<f32> },
    /// Raw Y values of a floor 1, in header order.
    One { y: Vec<i32> },
}

impl Floor {
    /// Reads one floor configuration.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - unknown floor type or a configuration
    ///   inconsistent with the codebooks or block sizes
    pub fn read(
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        block_sizes: [usize; 2],
    ) -> Result<Self> {
        match reader.read(16)? {
            0 => Ok(Self::Zero(Floor0::read(reader, codebooks, block_sizes)?)),
            1 => Ok(Self::One(Floor1::read(reader, codebooks)?)),
            other => Err(Error::header(format!("unsupported floor type {other}"))),
        }
    }

    /// Decodes this floor's packet data. `Ok(None)` means the floor is unused
    /// for the channel, either signalled or because the packet ended early.
    ///
    /// # Errors
    ///
    /// * `MalformedPacket` - a floor 0 book number beyond the configured list
    pub fn decode(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
    ) -> Result<Option<FloorPacket>> {
        let decoded = match self {
            Self::Zero(floor) => floor.decode(reader, codebooks)?,
            Self::One(floor) => floor.decode(reader, codebooks),
        };

        Ok(decoded.ok())
    }

    /// Renders decoded floor data into `curve`, whose length is half the
    /// current block size.
    pub fn synthesize(&self, packet: &FloorPacket, long_block: bool, curve: &mut [f32]) {
        match (self, packet) {
            (
                Self::Zero(floor),
                FloorPacket::Zero {
                    amplitude,
                    coefficients,
                },
            ) => floor.synthesize(*amplitude, coefficients, long_block, curve),
            (Self::One(floor), FloorPacket::One { y }) => floor.synthesize(y, curve),
            _ => curve.fill(0.0),
        }
    }
}

/// LSP-based floor.
#[derive(Debug, Clone)]
pub struct Floor0 {
    order: usize,
    bark_map_size: u32,
    amplitude_bits: u32,
    amplitude_offset: u32,
    books: Vec<usize>,
    /// Bark-scale maps for the short and long block sizes.
    bark_maps: [Vec<u32>; 2],
}

fn bark(x: f32) -> f32 {
    (0.000_000_018_5 * x * x).atan().mul_add(2.24, 13.1 * (0.000_74 * x).atan()) + 0.0001 * x
}

impl Floor0 {
    fn read(
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        block_sizes: [usize; 2],
    ) -> Result<Self> {
        let order = reader.read_usize(8)?;
        let rate = reader.read(16)?;
        let bark_map_size = reader.read(16)?;
        let amplitude_bits = reader.read(6)?;
        let amplitude_offset = reader.read(8)?;
        let book_count = reader.read_usize(4)? + 1;

        if order == 0 || rate == 0 || bark_map_size == 0 {
            return Err(Error::header(
                "floor 0 order, rate and bark map size must be non-zero",
            ));
        }
        if amplitude_bits > 32 {
            return Err(Error::header(format!(
                "floor 0 amplitude bits {amplitude_bits} exceed 32"
            )));
        }

        let mut books = Vec::with_capacity(book_count);
        for _ in 0..book_count {
            let book = reader.read_usize(8)?;
            match codebooks.get(book) {
                Some(codebook) if codebook.has_lookup() => books.push(book),
                Some(_) => {
                    return Err(Error::header(format!(
                        "floor 0 book {book} has no value mapping"
                    )));
                }
                None => {
                    return Err(Error::header(format!(
                        "floor 0 book {book} out of range"
                    )));
                }
            }
        }

        let bark_maps = block_sizes.map(|size| Self::bark_map(rate, bark_map_size, size / 2));

        Ok(Self {
            order,
            bark_map_size,
            amplitude_bits,
            amplitude_offset,
            books,
            bark_maps,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn bark_map(rate: u32, bark_map_size: u32, n: usize) -> Vec<u32> {
        let rate = rate as f32;
        let size = bark_map_size as f32;
        let scale = size / bark(0.5 * rate);

        (0..n)
            .map(|i| {
                let value = (bark(rate * i as f32 / (2.0 * n as f32)) * scale).floor();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let value = value.max(0.0) as u32;
                value.min(bark_map_size - 1)
            })
            .collect()
    }

    fn decode(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
    ) -> Result<std::result::Result<FloorPacket, EndOfPacket>> {
        let amplitude = match reader.read(self.amplitude_bits) {
            Ok(0) | Err(EndOfPacket) => return Ok(Err(EndOfPacket)),
            Ok(amplitude) => amplitude,
        };

        #[allow(clippy::cast_possible_wrap)]
        let Ok(book) = reader.read_usize(ilog(self.books.len() as i64)) else {
            return Ok(Err(EndOfPacket));
        };
        let Some(&book) = self.books.get(book) else {
            return Err(Error::packet(format!(
                "floor 0 book index {book} out of range"
            )));
        };
        let codebook = &codebooks[book];

        let mut coefficients = Vec::with_capacity(self.order + codebook.dimensions());
        let mut last = 0.0_f32;

        while coefficients.len() < self.order {
            let Ok(vector) = codebook.decode_vector(reader) else {
                return Ok(Err(EndOfPacket));
            };
            coefficients.extend(vector.iter().map(|value| value + last));
            last = coefficients.last().copied().unwrap_or(last);
        }

        Ok(Ok(FloorPacket::Zero {
            amplitude,
            coefficients,
        }))
    }

    #[allow(clippy::cast_precision_loss)]
    fn synthesize(&self, amplitude: u32, coefficients: &[f32], long_block: bool, curve: &mut [f32]) {
        let map = &self.bark_maps[usize::from(long_block)];
        let coefficients: Vec<f32> = coefficients[..self.order].iter().map(|c| c.cos()).collect();
        let amplitude = amplitude as f32;
        let offset = self.amplitude_offset as f32;
        let max_amplitude = ((1_u64 << self.amplitude_bits) - 1) as f32;

        let mut i = 0;
        while i < curve.len() && i < map.len() {
            let omega = PI * map[i] as f32 / self.bark_map_size as f32;
            let cos_omega = omega.cos();

            let (mut p, mut q) = if self.order % 2 == 1 {
                (cos_omega.mul_add(-cos_omega, 1.0), 0.25)
            } else {
                ((1.0 - cos_omega) / 2.0, (1.0 + cos_omega) / 2.0)
            };

            for pair in coefficients.chunks(2) {
                q *= 4.0 * (pair[0] - cos_omega).powi(2);
                if let Some(odd) = pair.get(1) {
                    p *= 4.0 * (odd - cos_omega).powi(2);
                }
            }

            let value = (0.115_129_25
                * (amplitude * offset / (max_amplitude * (p + q).sqrt()) - offset))
                .exp();

            // Every bin sharing the bark index takes the same value.
            let index = map[i];
            while i < curve.len() && i < map.len() && map[i] == index {
                curve[i] = value;
                i += 1;
            }
        }

        curve[i..].fill(0.0);
    }
}

/// One floor 1 partition class.
#[derive(Debug, Clone)]
struct Floor1Class {
    dimensions: usize,
    subclass_bits: u32,
    masterbook: Option<usize>,
    subclass_books: Vec<Option<usize>>,
}

/// Piecewise-linear floor.
#[derive(Debug, Clone)]
pub struct Floor1 {
    partition_classes: Vec<usize>,
    classes: Vec<Floor1Class>,
    multiplier: i32,
    x_list: Vec<i32>,
    /// Post indices ordered by ascending X.
    sorted: Vec<usize>,
    /// Low and high neighbour of every post from index 2 on.
    neighbors: Vec<(usize, usize)>,
}

impl Floor1 {
    fn read(reader: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Self> {
        let check_book = |book: usize| -> Result<usize> {
            if book < codebooks.len() {
                Ok(book)
            } else {
                Err(Error::header(format!("floor 1 book {book} out of range")))
            }
        };

        let partitions = reader.read_usize(5)?;
        let partition_classes = (0..partitions)
            .map(|_| reader.read_usize(4))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let class_count = partition_classes.iter().max().map_or(0, |max| max + 1);
        debug_assert!(class_count <= FLOOR1_MAX_CLASSES);

        let mut classes = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            let dimensions = reader.read_usize(3)? + 1;
            let subclass_bits = reader.read(2)?;
            let masterbook = if subclass_bits > 0 {
                Some(check_book(reader.read_usize(8)?)?)
            } else {
                None
            };

            let subclass_books = (0..1_usize << subclass_bits)
                .map(|_| match reader.read_usize(8)? {
                    0 => Ok(None),
                    book => check_book(book - 1).map(Some),
                })
                .collect::<Result<Vec<_>>>()?;

            classes.push(Floor1Class {
                dimensions,
                subclass_bits,
                masterbook,
                subclass_books,
            });
        }

        #[allow(clippy::cast_possible_wrap)]
        let multiplier = reader.read(2)? as i32 + 1;
        let range_bits = reader.read(4)?;

        #[allow(clippy::cast_possible_wrap)]
        let mut x_list = vec![0, 1_i32 << range_bits];
        for &class in &partition_classes {
            for _ in 0..classes[class].dimensions {
                if x_list.len() >= FLOOR1_MAX_POSTS {
                    return Err(Error::header("floor 1 declares more than 65 posts"));
                }
                #[allow(clippy::cast_possible_wrap)]
                x_list.push(reader.read(range_bits)? as i32);
            }
        }

        let mut sorted: Vec<usize> = (0..x_list.len()).collect();
        sorted.sort_by_key(|&i| x_list[i]);
        if sorted.windows(2).any(|pair| x_list[pair[0]] == x_list[pair[1]]) {
            return Err(Error::header("floor 1 X values are not unique"));
        }

        let neighbors = (2..x_list.len())
            .map(|i| neighbors(&x_list, i))
            .collect();

        trace!(
            "Floor 1: partitions={partitions} classes={class_count} posts={} multiplier={multiplier}",
            x_list.len()
        );

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            x_list,
            sorted,
            neighbors,
        })
    }

    const fn range(&self) -> i32 {
        #[allow(clippy::cast_sign_loss)]
        FLOOR1_RANGES[(self.multiplier - 1) as usize]
    }

    fn decode(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
    ) -> std::result::Result<FloorPacket, EndOfPacket> {
        if !reader.read_bool()? {
            return Err(EndOfPacket);
        }

        let bits = ilog(i64::from(self.range() - 1));
        let mut y = Vec::with_capacity(self.x_list.len());

        #[allow(clippy::cast_possible_wrap)]
        {
            y.push(reader.read(bits)? as i32);
            y.push(reader.read(bits)? as i32);
        }

        for &class in &self.partition_classes {
            let class = &self.classes[class];
            let mask = (1_u32 << class.subclass_bits) - 1;

            let mut cval = match class.masterbook {
                Some(book) => codebooks[book].decode_scalar(reader)?,
                None => 0,
            };

            for _ in 0..class.dimensions {
                let book = class.subclass_books[(cval & mask) as usize];
                cval >>= class.subclass_bits;

                #[allow(clippy::cast_possible_wrap)]
                y.push(match book {
                    Some(book) => codebooks[book].decode_scalar(reader)? as i32,
                    None => 0,
                });
            }
        }

        Ok(FloorPacket::One { y })
    }

    /// Turns the raw Y values into absolute post heights, flagging the posts
    /// that take part in the line rendering.
    fn amplitudes(&self, y: &[i32]) -> (Vec<i32>, Vec<bool>) {
        let range = self.range();
        let mut final_y = vec![0_i32; self.x_list.len()];
        let mut used = vec![false; self.x_list.len()];

        final_y[0] = y[0];
        final_y[1] = y[1];
        used[0] = true;
        used[1] = true;

        for (i, &(low, high)) in self.neighbors.iter().enumerate() {
            let i = i + 2;
            let predicted = render_point(
                self.x_list[low],
                final_y[low],
                self.x_list[high],
                final_y[high],
                self.x_list[i],
            );

            let value = y[i];
            let high_room = range - predicted;
            let low_room = predicted;
            let room = high_room.min(low_room) * 2;

            if value == 0 {
                final_y[i] = predicted;
                continue;
            }

            used[low] = true;
            used[high] = true;
            used[i] = true;

            final_y[i] = if value >= room {
                if high_room > low_room {
                    value - low_room + predicted
                } else {
                    predicted - value + high_room - 1
                }
            } else if value % 2 == 1 {
                predicted - (value + 1) / 2
            } else {
                predicted + value / 2
            };
        }

        (final_y, used)
    }

    fn synthesize(&self, y: &[i32], curve: &mut [f32]) {
        let (final_y, used) = self.amplitudes(y);
        let n = curve.len();
        let mut values = vec![0_i32; n];

        let mut lx = 0;
        let mut ly = final_y[self.sorted[0]] * self.multiplier;
        let mut hx = 0;
        let mut hy = ly;

        for &i in &self.sorted[1..] {
            if used[i] {
                hx = self.x_list[i];
                hy = final_y[i] * self.multiplier;
                render_line(lx, ly, hx, hy, &mut values);
                lx = hx;
                ly = hy;
            }
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let end = n as i32;
        if hx < end {
            render_line(hx, hy, end, hy, &mut values);
        }

        let table = &*INVERSE_DB_TABLE;
        for (out, value) in curve.iter_mut().zip(values) {
            #[allow(clippy::cast_sign_loss)]
            {
                *out = table[value.clamp(0, 255) as usize];
            }
        }
    }
}

/// Finds the nearest posts below and above post `index` by X among the posts
/// preceding it.
fn neighbors(x_list: &[i32], index: usize) -> (usize, usize) {
    let x = x_list[index];
    let mut low = 0;
    let mut high = 1;

    for (i, &candidate) in x_list[..index].iter().enumerate() {
        if candidate < x && candidate > x_list[low] {
            low = i;
        }
        if candidate > x && candidate < x_list[high] {
            high = i;
        }
    }

    (low, high)
}

fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
    let dy = y1 - y0;
    let adx = x1 - x0;
    let err = dy.abs() * (x - x0);
    let off = err / adx;

    if dy < 0 { y0 - off } else { y0 + off }
}

/// Bresenham-style integer line from `(x0, y0)` up to but excluding `x1`,
/// clipped to the output length.
fn render_line(x0: i32, y0: i32, x1: i32, y1: i32, out: &mut [i32]) {
    let dy = y1 - y0;
    let adx = x1 - x0;
    if adx <= 0 {
        return;
    }

    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let ady = dy.abs() - base.abs() * adx;

    let mut y = y0;
    let mut err = 0;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let len = out.len() as i32;

    #[allow(clippy::cast_sign_loss)]
    if (0..len).contains(&x0) {
        out[x0 as usize] = y;
    }

    for x in (x0 + 1)..x1.min(len) {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }

        #[allow(clippy::cast_sign_loss)]
        if x >= 0 {
            out[x as usize] = y;
        }
    }
}
