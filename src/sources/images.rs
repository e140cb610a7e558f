//! Camera frames: timestep → image lookup and per-LED pixel patches.
//!
//! Decoding the camera's RAW container is delegated to a [`RawDecoder`]. Each
//! lookup decodes one file, which the decoder opens, reads completely and
//! closes before returning.

use std::path::{Path, PathBuf};

use log::debug;

use crate::data::loader::{read_delimited, Delimited};
use crate::data::model::ChannelId;
use crate::error::{Error, Result};

pub const IMAGE_INFOS: &str = "analysis/image_infos_analysis.csv";
pub const IMAGE_INFOS_AVG: &str = "analysis/image_infos_analysis_avg.csv";
pub const LED_COORDINATES: &str = "analysis/led_search_areas_with_coordinates.csv";

const NAME_COLUMN: &str = "Name";
const TIME_COLUMN: &str = "Experiment_Time[s]";
const PIXEL_X_COLUMN: &str = " pixel position x";
const PIXEL_Y_COLUMN: &str = " pixel position y";

// ---------------------------------------------------------------------------
// Image info table
// ---------------------------------------------------------------------------

/// File name and whole-second experiment time of every analysed image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfoTable {
    names: Vec<String>,
    times: Vec<f64>,
}

impl ImageInfoTable {
    pub fn load(path: &Path) -> Result<ImageInfoTable> {
        let text = read_delimited(path, Delimited::csv())?;
        let name_idx = text.require(path, NAME_COLUMN)?;
        let time_idx = text.require(path, TIME_COLUMN)?;
        if text.rows.is_empty() {
            return Err(Error::malformed(path, "no images listed"));
        }

        let times = text
            .numeric_column(path, time_idx)?
            .into_iter()
            .map(f64::trunc)
            .collect();
        debug!("{}: {} images", path.display(), text.rows.len());
        Ok(ImageInfoTable {
            names: text.text_column(name_idx),
            times,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Experiment time of each image, in table order.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// File name of the first image taken at `timestep`.
    pub fn name_at(&self, timestep: f64) -> Result<&str> {
        self.times
            .iter()
            .position(|&t| t == timestep)
            .map(|row| self.names[row].as_str())
            .ok_or(Error::TimestepNotFound(timestep))
    }
}

// ---------------------------------------------------------------------------
// LED positions
// ---------------------------------------------------------------------------

/// Pixel position of every LED; the row number is the LED id.
#[derive(Debug, Clone, PartialEq)]
pub struct LedPositions(Vec<(usize, usize)>);

impl LedPositions {
    pub fn load(path: &Path) -> Result<LedPositions> {
        let text = read_delimited(path, Delimited::csv())?;
        let xs = text.numeric_column(path, text.require(path, PIXEL_X_COLUMN)?)?;
        let ys = text.numeric_column(path, text.require(path, PIXEL_Y_COLUMN)?)?;

        let positions = xs
            .into_iter()
            .zip(ys)
            .enumerate()
            .map(|(led, (x, y))| {
                if x.is_finite() && y.is_finite() && x >= 0.0 && y >= 0.0 {
                    Ok((x as usize, y as usize))
                } else {
                    Err(Error::malformed(path, format!("LED {led}: invalid pixel position")))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LedPositions(positions))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn position(&self, led_id: usize) -> Result<(usize, usize)> {
        self.0.get(led_id).copied().ok_or_else(|| Error::MissingKey {
            axis: "LED",
            key: led_id.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Raw frames
// ---------------------------------------------------------------------------

/// Visible sensor area of one RAW frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: usize,
    pub height: usize,
    /// Row-major sensor values.
    pub pixels: Vec<u16>,
    /// Row-major colour-filter code per pixel: 0 red, 1 green, 2 blue,
    /// 3 second green.
    pub colors: Vec<u8>,
    pub black_level: [u16; 4],
    pub white_level: u16,
}

/// Turns an image file into a [`RawFrame`].
pub trait RawDecoder {
    fn decode(&self, path: &Path) -> Result<RawFrame>;
}

/// Single-channel values scaled to a fixed bit depth.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGrid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

impl ChannelGrid {
    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    /// Rows `[x - radius, x + radius)` and columns `[y - radius, y + radius)`,
    /// clipped to the grid.
    pub fn crop(&self, x: usize, y: usize, radius: usize) -> ChannelGrid {
        let clip = |centre: usize, len: usize| {
            let end = (centre + radius).min(len);
            centre.saturating_sub(radius).min(end)..end
        };
        let rows = clip(x, self.height);
        let cols = clip(y, self.width);
        let width = cols.len();
        let height = rows.len();

        let mut data = Vec::with_capacity(width * height);
        for row in rows {
            let start = row * self.width;
            data.extend_from_slice(&self.data[start + cols.start..start + cols.end]);
        }
        ChannelGrid {
            width,
            height,
            data,
        }
    }
}

/// Keep the pixels of one colour channel, rescaled to `colordepth` bits.
///
/// Other pixels are zero. Channel 1 collects both green sites.
pub fn extract_channel(
    frame: &RawFrame,
    channel: ChannelId,
    colordepth: u32,
    source: &Path,
) -> Result<ChannelGrid> {
    if colordepth == 0 || colordepth > 16 {
        return Err(Error::malformed(source, format!("unsupported colour depth {colordepth}")));
    }
    let black = frame.black_level[channel.index()] as i32;
    let white = frame.white_level as i32;
    if white <= black {
        return Err(Error::malformed(
            source,
            format!("white level {white} not above black level {black}"),
        ));
    }
    if frame.pixels.len() != frame.width * frame.height || frame.colors.len() != frame.pixels.len() {
        return Err(Error::malformed(source, "frame size does not match its pixel data"));
    }

    let range = (1i64 << colordepth) - 1;
    let scale = range as f64 / (white - black) as f64;
    let wanted = |code: u8| match channel.get() {
        1 => code == 1 || code == 3,
        c => code == c,
    };

    let data = frame
        .pixels
        .iter()
        .zip(&frame.colors)
        .map(|(&px, &code)| {
            if !wanted(code) {
                return 0;
            }
            let scaled = ((px as i32 - black) as f64 * scale) as i64;
            scaled.clamp(0, range) as u16
        })
        .collect();

    Ok(ChannelGrid {
        width: frame.width,
        height: frame.height,
        data,
    })
}

/// 16-bit grayscale PNG holding an undemosaiced sensor dump.
#[derive(Debug, Clone, PartialEq)]
pub struct BayerPngDecoder {
    /// Colour code of the top-left 2×2 cell, row-major.
    pub pattern: [u8; 4],
    pub black_level: [u16; 4],
    pub white_level: u16,
}

impl BayerPngDecoder {
    /// RGGB mosaic.
    pub fn rggb(black_level: u16, white_level: u16) -> Self {
        BayerPngDecoder {
            pattern: [0, 1, 3, 2],
            black_level: [black_level; 4],
            white_level,
        }
    }
}

impl RawDecoder for BayerPngDecoder {
    fn decode(&self, path: &Path) -> Result<RawFrame> {
        let image = image::open(path)?.into_luma16();
        let (width, height) = (image.width() as usize, image.height() as usize);
        let colors = (0..height)
            .flat_map(|row| (0..width).map(move |col| self.pattern[(row % 2) * 2 + col % 2]))
            .collect();
        Ok(RawFrame {
            width,
            height,
            pixels: image.into_raw(),
            colors,
            black_level: self.black_level,
            white_level: self.white_level,
        })
    }
}

// ---------------------------------------------------------------------------
// ImageData
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ImageData<D: RawDecoder> {
    images_dir: PathBuf,
    image_info: ImageInfoTable,
    leds: LedPositions,
    decoder: D,
    colordepth: u32,
}

impl<D: RawDecoder> ImageData<D> {
    /// Image files live in `images_dir`; the image list and LED positions in
    /// `simulation_dir/analysis`.
    pub fn open(images_dir: &Path, simulation_dir: &Path, decoder: D, colordepth: u32) -> Result<Self> {
        Ok(ImageData {
            images_dir: images_dir.to_path_buf(),
            image_info: ImageInfoTable::load(&simulation_dir.join(IMAGE_INFOS))?,
            leds: LedPositions::load(&simulation_dir.join(LED_COORDINATES))?,
            decoder,
            colordepth,
        })
    }

    pub fn image_info(&self) -> &ImageInfoTable {
        &self.image_info
    }

    pub fn image_name(&self, timestep: f64) -> Result<&str> {
        self.image_info.name_at(timestep)
    }

    /// `(x, y)` pixel position of an LED.
    pub fn led_pixel(&self, led_id: usize) -> Result<(usize, usize)> {
        self.leds.position(led_id)
    }

    pub fn read_channel(&self, file: &Path, channel: ChannelId) -> Result<ChannelGrid> {
        let frame = self.decoder.decode(file)?;
        extract_channel(&frame, channel, self.colordepth, file)
    }

    /// Square patch of `2 * radius` pixels around an LED at `timestep`.
    pub fn led_array(
        &self,
        led_id: usize,
        timestep: f64,
        channel: ChannelId,
        radius: usize,
    ) -> Result<ChannelGrid> {
        let path = self.images_dir.join(self.image_name(timestep)?);
        let (x, y) = self.led_pixel(led_id)?;
        let grid = self.read_channel(&path, channel)?;
        Ok(grid.crop(x, y, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    struct FlatDecoder;

    impl RawDecoder for FlatDecoder {
        fn decode(&self, _path: &Path) -> Result<RawFrame> {
            Ok(RawFrame {
                width: 2,
                height: 2,
                pixels: vec![1_000, 2_000, 3_000, 20_000],
                colors: vec![0, 1, 3, 2],
                black_level: [1_000, 1_000, 1_000, 1_000],
                white_level: 9_191,
            })
        }
    }

    fn ch(c: u8) -> ChannelId {
        ChannelId::new(c).unwrap()
    }

    #[test]
    fn channel_values_are_rescaled_and_masked() {
        let frame = FlatDecoder.decode(Path::new("x")).unwrap();
        let src = Path::new("x");
        // (2^14 - 1) / (9191 - 1000) is just above 2
        let red = extract_channel(&frame, ch(0), 14, src).unwrap();
        assert_eq!(red.data, vec![0, 0, 0, 0]);
        let green = extract_channel(&frame, ch(1), 14, src).unwrap();
        assert_eq!(green.data, vec![0, 2_000, 4_000, 0]);
        let blue = extract_channel(&frame, ch(2), 14, src).unwrap();
        assert_eq!(blue.data, vec![0, 0, 0, 16_383]);
    }

    #[test]
    fn crop_is_clipped_to_the_grid() {
        let grid = ChannelGrid {
            width: 4,
            height: 3,
            data: (0..12).collect(),
        };
        let patch = grid.crop(1, 1, 1);
        assert_eq!((patch.height, patch.width), (2, 2));
        assert_eq!(patch.data, vec![0, 1, 4, 5]);

        let edge = grid.crop(2, 3, 2);
        assert_eq!((edge.height, edge.width), (3, 3));
        assert_eq!(edge.get(0, 0), Some(1));
        assert_eq!(edge.get(2, 2), Some(11));
    }

    fn write_simulation(dir: &Path) {
        std::fs::create_dir_all(dir.join("analysis")).unwrap();
        std::fs::write(
            dir.join(IMAGE_INFOS),
            "Name,Experiment_Time[s]\nimg_0.png,0\nimg_1.png,10.7\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(LED_COORDINATES),
            ",led_id, pixel position x, pixel position y\n0,0,1,2\n1,1,3,3\n",
        )
        .unwrap();
    }

    #[test]
    fn led_patch_is_read_from_png_mosaic() {
        let dir = tempfile::tempdir().unwrap();
        write_simulation(dir.path());
        let pixels: Vec<u16> = (0..16).map(|i| 1_000 + i * 100).collect();
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(4, 4, pixels)
            .unwrap()
            .save(dir.path().join("img_1.png"))
            .unwrap();

        let decoder = BayerPngDecoder::rggb(1_000, 9_191);
        let images = ImageData::open(dir.path(), dir.path(), decoder, 14).unwrap();
        assert_eq!(images.image_name(10.0).unwrap(), "img_1.png");
        assert_eq!(images.led_pixel(0).unwrap(), (1, 2));

        let patch = images.led_array(0, 10.0, ch(2), 1).unwrap();
        // rows 0..2, cols 1..3; blue sits at odd row, odd column
        assert_eq!((patch.height, patch.width), (2, 2));
        assert_eq!(patch.data, vec![0, 0, 1_000, 0]);
    }

    #[test]
    fn lookups_report_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_simulation(dir.path());
        let images = ImageData::open(dir.path(), dir.path(), FlatDecoder, 14).unwrap();
        assert!(matches!(images.image_name(5.0), Err(Error::TimestepNotFound(_))));
        assert!(matches!(images.led_pixel(7), Err(Error::MissingKey { .. })));
    }
}
