use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use clap::Parser;
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{prelude::*, IxDyn};
use tempfile::TempDir;

use inpaint_prep::{
    mocks::{MisshapenModel, MockInpaintModel},
    Config, ImageProcessor, Images, InpaintParams, InpaintPipeline, InpaintPrepError,
    InpaintRequest, MaskedPreview, OutputType,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn gradient_image(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x * 4 % 256) as u8, (y * 4 % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Left half masked.
fn half_mask(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, _| Luma([if x < size / 2 { 255 } else { 0 }]))
}

fn params() -> InpaintParams {
    InpaintParams::new("a photo of a cat")
        .with_seed(0)
        .with_num_inference_steps(2)
        .with_guidance_scale(6.0)
}

#[test]
fn test_pipeline_bitmap_request() -> TestResult {
    let pipeline = InpaintPipeline::new(MockInpaintModel::new(1.0));
    let request = InpaintRequest::new(gradient_image(64), half_mask(64)).with_params(params());

    let output = pipeline.call(request)?;
    let Images::Pil(images) = output.images else {
        panic!("expected bitmap output");
    };

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].dimensions(), (64, 64));
    // masked pixels are painted white by the mock, the rest is kept
    assert_eq!(*images[0].get_pixel(0, 10), Rgb([255, 255, 255]));
    assert_eq!(*images[0].get_pixel(40, 10), *gradient_image(64).get_pixel(40, 10));
    Ok(())
}

#[test]
fn test_num_images_per_prompt() -> TestResult {
    let pipeline = InpaintPipeline::new(MockInpaintModel::new(1.0));
    let request = InpaintRequest::new(gradient_image(32), half_mask(32))
        .with_params(params())
        .with_num_images_per_prompt(2);

    let output = pipeline.call(request)?;
    assert_eq!(output.images.len(), 2);
    assert_eq!(output.mask.shape(), &[2, 1, 32, 32]);
    Ok(())
}

#[test]
fn test_np_output() -> TestResult {
    let pipeline = InpaintPipeline::new(MaskedPreview);
    let request = InpaintRequest::new(gradient_image(64), half_mask(64))
        .with_output_type(OutputType::Np);

    let output = pipeline.call(request)?;
    let Images::Np(images) = output.images else {
        panic!("expected array output");
    };

    assert_eq!(images.shape(), &[1, 64, 64, 3]);
    assert!(images.iter().all(|&v| (0.0..=1.0).contains(&v)));
    // masked pixels are zero in [-1, 1], mid gray in [0, 1]
    assert_eq!(images[[0, 0, 0, 0]], 0.5);
    Ok(())
}

#[test]
fn test_bitmap_and_tensor_requests_agree() -> TestResult {
    let pipeline = InpaintPipeline::new(MockInpaintModel::new(0.25));
    let image = gradient_image(16);
    let mask = half_mask(16);

    let image_tensor = Array3::from_shape_fn((3, 16, 16), |(c, y, x)| {
        f32::from(image.get_pixel(x as u32, y as u32)[c]) / 127.5 - 1.0
    })
    .into_dyn()
    .insert_axis(Axis(0));
    let mask_tensor = Array2::from_shape_fn((16, 16), |(y, x)| {
        f32::from(mask.get_pixel(x as u32, y as u32)[0]) / 255.0
    })
    .into_dyn();

    let from_bitmaps = pipeline.call(
        InpaintRequest::new(image, mask).with_output_type(OutputType::Np),
    )?;
    let from_tensors = pipeline.call(
        InpaintRequest::new(image_tensor, mask_tensor).with_output_type(OutputType::Np),
    )?;

    assert_eq!(from_bitmaps.images, from_tensors.images);
    Ok(())
}

#[test]
fn test_invalid_requests() {
    let pipeline = InpaintPipeline::new(MaskedPreview);

    let err = pipeline
        .call(InpaintRequest::new(gradient_image(8), half_mask(8)).with_num_images_per_prompt(0))
        .unwrap_err();
    assert!(matches!(err, InpaintPrepError::Validation { .. }));

    let err = pipeline
        .call(
            InpaintRequest::new(gradient_image(8), half_mask(8))
                .with_params(InpaintParams::default().with_num_inference_steps(0)),
        )
        .unwrap_err();
    assert!(matches!(err, InpaintPrepError::Validation { .. }));

    let err = pipeline
        .call(InpaintRequest::new(gradient_image(8), half_mask(16)))
        .unwrap_err();
    assert!(err.is_shape());

    let err = pipeline
        .call(InpaintRequest::new(
            gradient_image(8),
            ArrayD::<f32>::zeros(IxDyn(&[8, 8])),
        ))
        .unwrap_err();
    assert!(err.is_type_mismatch());
}

#[test]
fn test_model_output_shape_is_checked() {
    let pipeline = InpaintPipeline::new(MisshapenModel);
    let err = pipeline
        .call(InpaintRequest::new(gradient_image(8), half_mask(8)))
        .unwrap_err();
    assert!(
        matches!(err, InpaintPrepError::Validation { ref field, .. } if field == "model output")
    );
}

#[test]
fn test_settings_ignored_by_the_model_are_rejected() {
    let pipeline = InpaintPipeline::new(MaskedPreview);

    let err = pipeline
        .call(InpaintRequest::new(gradient_image(8), half_mask(8)).with_params(params()))
        .unwrap_err();
    assert!(matches!(err, InpaintPrepError::Validation { ref field, .. } if field == "prompt"));

    let err = pipeline
        .call(
            InpaintRequest::new(gradient_image(8), half_mask(8))
                .with_params(InpaintParams::default().with_seed(3)),
        )
        .unwrap_err();
    assert!(matches!(err, InpaintPrepError::Validation { ref field, .. } if field == "seed"));
}

fn write_pair(root: &Path, relative: &str, size: u32) -> TestResult {
    let image_path = root.join("input").join(relative);
    let mask_path = root.join("masks").join(relative);
    fs::create_dir_all(image_path.parent().unwrap())?;
    fs::create_dir_all(mask_path.parent().unwrap())?;
    gradient_image(size).save(&image_path)?;
    half_mask(size).save(&mask_path)?;
    Ok(())
}

fn directory_config(root: &Path) -> Config {
    let input = root.join("input");
    let masks = root.join("masks");
    let output = root.join("output");
    Config::parse_from([
        OsStr::new("inpaint-prep"),
        input.as_os_str(),
        output.as_os_str(),
        OsStr::new("--mask-dir"),
        masks.as_os_str(),
        OsStr::new("--save-masks"),
    ])
}

#[test]
fn test_process_directory() -> TestResult {
    let temp_dir = TempDir::new()?;
    write_pair(temp_dir.path(), "a.png", 16)?;
    write_pair(temp_dir.path(), "nested/b.png", 16)?;

    let processor = ImageProcessor::new(MaskedPreview, directory_config(temp_dir.path()));
    let count = processor.process_directory()?;
    assert_eq!(count, 2);

    let output_dir = temp_dir.path().join("output");
    let result = image::open(output_dir.join("nested/b.png"))?.into_rgb8();
    assert_eq!(*result.get_pixel(0, 0), Rgb([128, 128, 128]));
    assert_eq!(*result.get_pixel(12, 3), *gradient_image(16).get_pixel(12, 3));

    let mask = image::open(output_dir.join("a_mask.png"))?.into_luma8();
    assert_eq!(*mask.get_pixel(0, 0), Luma([255]));
    assert_eq!(*mask.get_pixel(15, 0), Luma([0]));
    Ok(())
}

#[test]
fn test_missing_mask_is_reported() -> TestResult {
    let temp_dir = TempDir::new()?;
    write_pair(temp_dir.path(), "a.png", 8)?;
    let orphan = temp_dir.path().join("input").join("orphan.png");
    gradient_image(8).save(&orphan)?;

    let processor = ImageProcessor::new(MaskedPreview, directory_config(temp_dir.path()));
    let err = processor.process_directory().unwrap_err();
    assert!(matches!(err, InpaintPrepError::FileSystem { .. }));
    Ok(())
}

#[test]
fn test_inputs_sharing_a_stem_are_rejected() -> TestResult {
    let temp_dir = TempDir::new()?;
    write_pair(temp_dir.path(), "cat.png", 8)?;
    gradient_image(8).save(temp_dir.path().join("input").join("cat.jpg"))?;

    let processor = ImageProcessor::new(MaskedPreview, directory_config(temp_dir.path()));
    let err = processor.process_directory().unwrap_err();
    assert!(matches!(err, InpaintPrepError::Validation { ref field, .. } if field == "input_dir"));
    assert!(!temp_dir.path().join("output").join("cat.png").exists());
    Ok(())
}

#[test]
fn test_cli_settings_are_checked_against_the_model() -> TestResult {
    let temp_dir = TempDir::new()?;
    write_pair(temp_dir.path(), "a.png", 8)?;

    let mut config = directory_config(temp_dir.path());
    config.guidance_scale = 3.0;
    let err = ImageProcessor::new(MaskedPreview, config.clone())
        .process_directory()
        .unwrap_err();
    assert!(
        matches!(err, InpaintPrepError::Validation { ref field, .. } if field == "guidance_scale")
    );

    assert_eq!(ImageProcessor::new(MockInpaintModel::new(1.0), config).process_directory()?, 1);
    Ok(())
}

#[test]
fn test_empty_input_directory() -> TestResult {
    let temp_dir = TempDir::new()?;
    fs::create_dir_all(temp_dir.path().join("input"))?;

    let processor = ImageProcessor::new(MaskedPreview, directory_config(temp_dir.path()));
    assert_eq!(processor.process_directory()?, 0);
    Ok(())
}
