use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use car_damage::{
    config::{DeviceConfig, ProjectConfig, DAMAGE_CLASSES, PART_CLASSES},
    mocks::MockSegmentationModel,
    AnalyzeConfig, DamageAnalyzer, DamageCategory, Device, ImageProcessor,
};

fn config(root: &Path, input: PathBuf, json: bool) -> AnalyzeConfig {
    AnalyzeConfig {
        project: ProjectConfig {
            root: root.to_path_buf(),
            models_dir: None,
        },
        device: DeviceConfig {
            device: Device::Cpu,
            device_id: 0,
        },
        input: Some(input),
        output_dir: root.join("output"),
        format: "png".to_string(),
        skip_enhance: true,
        enhancer_path: None,
        overlay: DamageCategory::ALL.to_vec(),
        opacity: 0.6,
        json,
        num_threads: 0,
    }
}

// scratches cover the left half, everything else is undamaged; the whole frame is vehicle
fn analyzer() -> DamageAnalyzer<MockSegmentationModel> {
    let clean = MockSegmentationModel::new(16, DAMAGE_CLASSES);
    let scratched = clean.clone().with_pattern(|x, _| u8::from(x < 8));
    let part = MockSegmentationModel::new(16, PART_CLASSES).with_pattern(|_, y| 1 + (y % 15) as u8);
    DamageAnalyzer::new([clean.clone(), clean.clone(), scratched, clean], part).unwrap()
}

#[test]
fn single_photo_writes_panel_overlay_and_report() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("111.jpg");
    RgbImage::from_pixel(64, 48, Rgb([120, 120, 120]))
        .save(&input)
        .unwrap();

    let processor = ImageProcessor::new(analyzer(), config(temp_dir.path(), input, true));
    let reports = processor.run().unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    // part labels 1..=15 then 1 again down the rows: (120 + 1) * 16
    assert_eq!(report.part_area, 1936);
    assert_eq!(report.total_cost, 128 * 60);
    // 128 * 1.0 * 100 / (3 * 1936) = 2.20
    assert_eq!(report.severity.grade.value(), 4);

    let output = temp_dir.path().join("output");
    let panel = image::open(output.join("111_panel.png")).unwrap();
    assert_eq!((panel.width(), panel.height()), (80, 16));
    assert!(output.join("111_overlay.png").exists());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("111.json")).unwrap()).unwrap();
    assert_eq!(json["total_cost"], 7680);
}

#[test]
fn directory_mode_mirrors_the_tree() {
    let temp_dir = TempDir::new().unwrap();
    let input_dir = temp_dir.path().join("photos");
    let subdir = input_dir.join("lot-b");
    fs::create_dir_all(&subdir).unwrap();
    for path in [input_dir.join("a.png"), subdir.join("b.png")] {
        RgbImage::new(20, 20).save(path).unwrap();
    }
    fs::write(input_dir.join("readme.txt"), "not an image").unwrap();

    let processor = ImageProcessor::new(analyzer(), config(temp_dir.path(), input_dir, false));
    let reports = processor.run().unwrap();

    assert_eq!(reports.len(), 2);
    let output = temp_dir.path().join("output");
    assert!(output.join("a_panel.png").exists());
    assert!(output.join("lot-b").join("b_overlay.png").exists());
    assert!(!output.join("a.json").exists());
}

#[test]
fn missing_photo_aborts() {
    let temp_dir = TempDir::new().unwrap();
    let processor = ImageProcessor::new(
        analyzer(),
        config(temp_dir.path(), temp_dir.path().join("image/111.jpg"), false),
    );
    let err = processor.run().unwrap_err();
    assert!(err.to_string().contains("Image file not found"));
}

#[test]
fn missing_weights_abort_before_loading() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("111.jpg");
    let result = ImageProcessor::with_onnx_models(config(temp_dir.path(), input, false));
    let err = result.err().expect("no weights on disk");
    assert!(err.to_string().contains("[DAMAGE][Breakage_3]Unet.onnx"));
}
