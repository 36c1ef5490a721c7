use image::RgbaImage;

use crate::{color::Rgb, traits::EdgeExtractor};

/// Flags covered pixels that touch an uncovered 4-connected neighbour.
///
/// Neighbours outside the buffer are not consulted, so a mask that runs off the image
/// edge is not framed.
#[derive(Debug, Clone, Default)]
pub struct FourNeighbourEdges;

impl EdgeExtractor for FourNeighbourEdges {
    fn edge_pixels(&self, layer: &RgbaImage) -> Vec<bool> {
        outline_pixels(layer)
    }
}

pub fn outline_pixels(layer: &RgbaImage) -> Vec<bool> {
    let (width, height) = layer.dimensions();
    let alpha = |x: u32, y: u32| layer.get_pixel(x, y)[3];

    let mut edges = vec![false; (width as usize) * (height as usize)];
    for y in 0..height {
        for x in 0..width {
            if alpha(x, y) == 0 {
                continue;
            }
            let touches_empty = (x > 0 && alpha(x - 1, y) == 0)
                || (x + 1 < width && alpha(x + 1, y) == 0)
                || (y > 0 && alpha(x, y - 1) == 0)
                || (y + 1 < height && alpha(x, y + 1) == 0);
            edges[(y as usize) * (width as usize) + x as usize] = touches_empty;
        }
    }
    edges
}

/// Edge pass: paint flagged pixels in `color` at a fixed alpha, independent of fill opacity
pub fn apply_outline(layer: &mut RgbaImage, edges: &[bool], color: Rgb, alpha: u8) {
    let outline = color.to_rgba(alpha);
    for (pixel, _) in layer.pixels_mut().zip(edges).filter(|(_, edge)| **edge) {
        *pixel = outline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn square_layer() -> RgbaImage {
        let mut layer = RgbaImage::new(5, 5);
        for y in 1..4 {
            for x in 1..4 {
                layer.put_pixel(x, y, Rgba([0, 0, 255, 40]));
            }
        }
        layer
    }

    #[test]
    fn test_ring_of_square_is_flagged() {
        let layer = square_layer();
        let edges = outline_pixels(&layer);

        let flagged: Vec<(u32, u32)> = (0..25u32)
            .filter(|i| edges[*i as usize])
            .map(|i| (i % 5, i / 5))
            .collect();
        assert_eq!(flagged.len(), 8);
        assert!(!edges[2 * 5 + 2], "center pixel is interior");
        assert!(!edges[0], "transparent pixels are never edges");
    }

    #[test]
    fn test_buffer_border_is_not_an_edge() {
        let layer = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 255, 40]));
        assert!(outline_pixels(&layer).iter().all(|edge| !edge));
    }

    #[test]
    fn test_outline_uses_fixed_alpha() {
        let mut layer = square_layer();
        let edges = FourNeighbourEdges.edge_pixels(&layer);
        apply_outline(&mut layer, &edges, Rgb::new(0, 0, 255), 230);

        assert_eq!(layer.get_pixel(1, 1), &Rgba([0, 0, 255, 230]));
        assert_eq!(layer.get_pixel(2, 2), &Rgba([0, 0, 255, 40]));
        assert_eq!(layer.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }
}
