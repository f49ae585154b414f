use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Outer borders of every foreground region that is not nested inside another region.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .collect()
}

/// Stamp a `width`-pixel square on every contour point. Contour points are 8-connected,
/// so the stamps join into a closed outline.
pub fn draw_contours(image: &mut RgbImage, contours: &[Contour<i32>], color: Rgb<u8>, width: u32) {
    let width = width.max(1);
    let offset = (width / 2) as i32;
    for point in contours.iter().flat_map(|contour| contour.points.iter()) {
        draw_filled_rect_mut(
            image,
            Rect::at(point.x - offset, point.y - offset).of_size(width, width),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_mask(size: u32, from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = (from..to).contains(&x) && (from..to).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_empty_mask_has_no_contours() {
        assert!(external_contours(&GrayImage::new(16, 16)).is_empty());
    }

    #[test]
    fn test_single_pixel() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, Luma([255]));
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!((contours[0].points[0].x, contours[0].points[0].y), (2, 2));
    }

    #[test]
    fn test_hole_and_island_are_not_external() {
        // ring with an island in the middle
        let mut mask = square_mask(20, 2, 18);
        for y in 6..14 {
            for x in 6..14 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 9..11 {
            for x in 9..11 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(external_contours(&mask).len(), 1);
    }

    #[test]
    fn test_outline_is_drawn_on_border_only() {
        let mask = square_mask(32, 8, 24);
        let mut image = RgbImage::from_pixel(32, 32, Rgb([10, 10, 10]));
        let green = Rgb([0, 255, 0]);
        draw_contours(&mut image, &external_contours(&mask), green, 2);

        assert_eq!(image.get_pixel(8, 8), &green);
        assert_eq!(image.get_pixel(23, 16), &green);
        assert_eq!(image.get_pixel(16, 16), &Rgb([10, 10, 10]));
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 10, 10]));
    }

    #[test]
    fn test_outline_at_image_edge_is_clipped() {
        let mask = square_mask(8, 0, 8);
        let mut image = RgbImage::new(8, 8);
        draw_contours(&mut image, &external_contours(&mask), Rgb([0, 255, 0]), 3);
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 255, 0]));
    }
}
