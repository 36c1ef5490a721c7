use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use overlay::scheduler::{ImageElement, LayoutRect};
use overlay::{
    CommitOutcome, DisplayOptions, MaskCompositor, MaskLoader, MemoryMaskLoader, OverlayError,
    OverlayScheduler, Region, Rgb, Sample, color_for,
};

fn png_mask(width: u32, height: u32) -> Vec<u8> {
    let mut mask = GrayImage::new(width, height);
    for y in height / 4..height * 3 / 4 {
        for x in width / 4..width * 3 / 4 {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(mask)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Memory loader that sleeps before answering selected URLs
struct SlowLoader {
    inner: MemoryMaskLoader,
    delays: HashMap<String, Duration>,
}

impl MaskLoader for SlowLoader {
    async fn fetch(&self, url: &str) -> overlay::Result<Vec<u8>> {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.inner.fetch(url).await
    }
}

fn ready_scheduler(sample: Sample) -> OverlayScheduler {
    let mut scheduler = OverlayScheduler::new(9, DisplayOptions::default());
    assert!(scheduler.mount_surface().is_none());
    assert!(scheduler.mount_image(ImageElement::default()).is_none());
    assert!(scheduler.set_sample(sample).is_none(), "image not loaded yet");
    scheduler
}

#[tokio::test]
async fn slow_pass_never_overwrites_newer_frame() {
    let loader = MemoryMaskLoader::new();
    loader.insert("masks/slow.png", png_mask(40, 40));
    let compositor = MaskCompositor::new(SlowLoader {
        inner: loader,
        delays: HashMap::from([("masks/slow.png".to_string(), Duration::from_millis(150))]),
    });
    let resolver = |_: i64, mask_ref: &str| -> Option<String> { Some(format!("masks/{mask_ref}")) };

    let sample = Sample::new(
        1,
        vec![Region::with_bbox([0.0, 0.0, 40.0, 40.0]).concept(1, "roof").mask("slow.png")],
    );
    let mut scheduler = ready_scheduler(sample);
    let slow = scheduler
        .on_image_load(40, 40, LayoutRect::new(40.0, 40.0))
        .expect("first pass");

    // The option change lands while the first pass is still waiting on its mask.
    let (older, newer) = tokio::join!(slow.run(&compositor, &resolver), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = scheduler.set_show_masks(false).expect("option changed");
        fast.run(&compositor, &resolver).await
    });
    assert_eq!(older.report.drawn, 1, "ticket was current when the fetch started");

    assert_eq!(scheduler.commit(newer), CommitOutcome::Applied);
    assert_eq!(
        scheduler.commit(older),
        CommitOutcome::Stale { generation: 1, latest: 2 }
    );

    let frame = scheduler.current_frame().expect("frame on surface");
    assert_eq!(frame.generation, 2);
    assert_eq!(frame.mask_layer.get_pixel(20, 20)[3], 0, "masks hidden in newest frame");
}

#[tokio::test]
async fn failed_mask_does_not_block_the_others() {
    let loader = MemoryMaskLoader::new();
    loader.insert("r1.png", png_mask(20, 20));
    loader.insert("r3.png", png_mask(20, 20));
    let compositor = MaskCompositor::new(loader);
    let resolver = |_: i64, mask_ref: &str| -> Option<String> { Some(mask_ref.to_string()) };

    let regions = vec![
        Region::with_bbox([0.0, 0.0, 10.0, 10.0]).concept(1, "roof").mask("r1.png"),
        Region::with_bbox([5.0, 5.0, 10.0, 10.0]).concept(2, "tree").mask("r2.png"),
        Region::with_bbox([8.0, 8.0, 10.0, 10.0]).concept(12, "car").mask("r3.png"),
    ];
    let mut scheduler = ready_scheduler(Sample::new(2, regions.clone()));
    let pass = scheduler
        .on_image_load(20, 20, LayoutRect::new(20.0, 20.0))
        .expect("pass");

    let frame = pass.run(&compositor, &resolver).await;
    assert_eq!(frame.report.drawn, 2);
    assert_eq!(frame.report.failed, 1);
    assert!(!frame.report.cancelled);

    // Masks 1 and 3 cover the same pixels; the later one sits on top.
    let bottom = Rgb::from_hex(&color_for(&regions[0])).expect("valid color");
    let top = Rgb::from_hex(&color_for(&regions[2])).expect("valid color");
    let pixel = frame.mask_layer.get_pixel(10, 10);
    let distance = |c: Rgb| {
        (pixel[0] as i32 - c.r as i32).abs()
            + (pixel[1] as i32 - c.g as i32).abs()
            + (pixel[2] as i32 - c.b as i32).abs()
    };
    assert!(pixel[3] > 150, "two stacked fills");
    assert!(distance(top) < distance(bottom));

    let vector = frame.vector.as_ref().expect("boxes shown");
    assert_eq!(vector.shapes.len(), 3);
    assert_eq!(scheduler.commit(frame), CommitOutcome::Applied);
}

#[tokio::test]
async fn missing_mask_surfaces_not_found() {
    let loader = MemoryMaskLoader::new();
    let err = loader.fetch("nowhere.png").await.expect_err("empty loader");
    assert!(matches!(err, OverlayError::MaskNotFound(_)));
}

#[tokio::test]
async fn flattened_frame_keeps_photo_outside_overlays() {
    let compositor = MaskCompositor::new(MemoryMaskLoader::new());
    let resolver = overlay::PassthroughResolver;
    let mut scheduler = ready_scheduler(Sample::new(
        3,
        vec![Region::with_bbox([10.0, 10.0, 20.0, 20.0]).concept(4, "sign")],
    ));
    let pass = scheduler
        .on_image_load(40, 40, LayoutRect::new(40.0, 40.0))
        .expect("pass");
    let frame = pass.run(&compositor, &resolver).await;

    let photo = RgbaImage::from_pixel(40, 40, image::Rgba([200, 200, 200, 255]));
    let flat = frame.flatten(&photo);
    assert_eq!(flat.get_pixel(35, 35), &image::Rgba([200, 200, 200, 255]));
    assert_ne!(flat.get_pixel(10, 15), &image::Rgba([200, 200, 200, 255]), "box edge drawn");
}
