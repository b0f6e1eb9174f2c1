use image::{GrayImage, Luma};

/// Weights below this are treated as zero, which bounds the lookup table.
const WEIGHT_CUTOFF: f64 = 1e-6;
const MAX_PATCH_DISTANCE: u64 = 255 * 255;

/// Non-local means denoising of a grayscale image.
///
/// Every pixel becomes the weighted mean of the pixels in its `search`
/// window, each weighted by `exp(-d / h^2)` where `d` is the mean squared
/// difference between the two `template` sized patches, rounded to an
/// integer and looked up in a precomputed table. Patch distances are taken
/// from one summed-area table per search offset; rows are accumulated on
/// scoped threads.
pub(super) fn denoise_nl_means(
    image: &GrayImage,
    h: f32,
    template: u32,
    search: u32,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || h <= 0.0 {
        return image.clone();
    }

    let w = width as usize;
    let hgt = height as usize;
    let search_radius = (search / 2) as i64;
    let pixels = image.as_raw();
    let weights = weight_table(h);

    let threads = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        .clamp(1, hgt);
    let rows_per_chunk = hgt.div_ceil(threads);

    let mut weight_sum = vec![0f64; w * hgt];
    let mut value_sum = vec![0f64; w * hgt];
    let mut diff = vec![0u64; w * hgt];
    let mut table = vec![0u64; (w + 1) * (hgt + 1)];

    for dy in -search_radius..=search_radius {
        for dx in -search_radius..=search_radius {
            for y in 0..hgt {
                let sy = clamp_index(y as i64 + dy, hgt);
                for x in 0..w {
                    let sx = clamp_index(x as i64 + dx, w);
                    let delta = pixels[y * w + x] as i64 - pixels[sy * w + sx] as i64;
                    diff[y * w + x] = (delta * delta) as u64;
                }
            }
            fill_integral(&diff, w, hgt, &mut table);

            let pass = OffsetPass {
                pixels,
                table: &table,
                weights: &weights,
                width: w,
                height: hgt,
                template_radius: (template / 2) as i64,
                dx,
                dy,
            };
            std::thread::scope(|scope| {
                let chunks = weight_sum
                    .chunks_mut(rows_per_chunk * w)
                    .zip(value_sum.chunks_mut(rows_per_chunk * w))
                    .enumerate();
                for (chunk, (weight_rows, value_rows)) in chunks {
                    let pass = &pass;
                    scope.spawn(move || {
                        pass.accumulate(chunk * rows_per_chunk, weight_rows, value_rows)
                    });
                }
            });
        }
    }

    let mut output = GrayImage::new(width, height);
    for (idx, pixel) in output.pixels_mut().enumerate() {
        let value = if weight_sum[idx] > 0.0 {
            value_sum[idx] / weight_sum[idx]
        } else {
            pixels[idx] as f64
        };
        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    output
}

/// One search offset `(dx, dy)` with its patch-distance table filled.
struct OffsetPass<'a> {
    pixels: &'a [u8],
    table: &'a [u64],
    weights: &'a [f64],
    width: usize,
    height: usize,
    template_radius: i64,
    dx: i64,
    dy: i64,
}

impl OffsetPass<'_> {
    fn accumulate(&self, first_row: usize, weight_sum: &mut [f64], value_sum: &mut [f64]) {
        let w = self.width;
        let stride = w + 1;
        let rows = weight_sum.len() / w;
        for row in 0..rows {
            let y = first_row + row;
            let y1 = (y as i64 - self.template_radius).max(0) as usize;
            let y2 = ((y as i64 + self.template_radius + 1) as usize).min(self.height);
            let sy = clamp_index(y as i64 + self.dy, self.height);
            for x in 0..w {
                let x1 = (x as i64 - self.template_radius).max(0) as usize;
                let x2 = ((x as i64 + self.template_radius + 1) as usize).min(w);
                let area = ((x2 - x1) * (y2 - y1)) as u64;
                let ssd = self.table[y2 * stride + x2] + self.table[y1 * stride + x1]
                    - self.table[y1 * stride + x2]
                    - self.table[y2 * stride + x1];
                let distance = (ssd + area / 2) / area;
                let Some(&weight) = self.weights.get(distance as usize) else {
                    continue;
                };
                let sx = clamp_index(x as i64 + self.dx, w);
                weight_sum[row * w + x] += weight;
                value_sum[row * w + x] += weight * self.pixels[sy * w + sx] as f64;
            }
        }
    }
}

/// `exp(-d / h^2)` for every integer mean patch distance `d` whose weight is
/// above [`WEIGHT_CUTOFF`].
fn weight_table(h: f32) -> Vec<f64> {
    let inv_h2 = 1.0 / (h as f64 * h as f64);
    (0..=MAX_PATCH_DISTANCE)
        .map(|distance| (-(distance as f64) * inv_h2).exp())
        .take_while(|weight| *weight >= WEIGHT_CUTOFF)
        .collect()
}

fn clamp_index(value: i64, len: usize) -> usize {
    value.clamp(0, len as i64 - 1) as usize
}

/// `table[(y + 1) * (w + 1) + (x + 1)]` holds the sum of `values` over
/// `[0, x] x [0, y]`.
fn fill_integral(values: &[u64], w: usize, h: usize, table: &mut [u64]) {
    let stride = w + 1;
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += values[y * w + x];
            table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
        }
    }
}
