use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::errors::{InpaintPrepError, Result};
use crate::input::{ImageInput, MaskInput};
use crate::pipeline::{Images, InpaintPipeline, InpaintRequest, OutputType};
use crate::postprocess::mask_to_gray_images;
use crate::traits::InpaintModel;

/// Runs every image/mask pair of a directory through an [`InpaintPipeline`].
pub struct ImageProcessor<M: InpaintModel> {
    pipeline: InpaintPipeline<M>,
    config: Config,
}

impl<M: InpaintModel> ImageProcessor<M> {
    pub const fn new(model: M, config: Config) -> Self {
        Self {
            pipeline: InpaintPipeline::new(model),
            config,
        }
    }

    pub fn process_directory(&self) -> Result<usize> {
        let input_path = &self.config.input_dir;
        let output_path = &self.config.output_dir;

        if !input_path.exists() {
            return Err(InpaintPrepError::FileSystem {
                path: input_path.clone(),
                operation: "input directory lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        let model = self.pipeline.model();
        self.config
            .inference_params()
            .check_supported(model.param_support(), model.name())?;

        fs::create_dir_all(output_path).map_err(|e| InpaintPrepError::FileSystem {
            path: output_path.clone(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;

        let image_files = self.collect_image_files(input_path);
        if image_files.is_empty() {
            warn!(dir = %input_path.display(), "no images to process");
            return Ok(0);
        }
        self.check_output_collisions(&image_files)?;

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .map_err(|e| InpaintPrepError::Configuration {
                message: e.to_string(),
            })?
            .progress_chars("#>-"),
        );

        image_files
            .par_iter()
            .try_for_each(|input_file| -> Result<()> {
                self.process_single_image(input_file)?;
                pb.inc(1);
                Ok(())
            })?;

        pb.finish_and_clear();
        info!(
            count = image_files.len(),
            model = self.pipeline.model().name(),
            "all images processed"
        );
        Ok(image_files.len())
    }

    fn collect_image_files(&self, input_path: &Path) -> Vec<PathBuf> {
        let mut image_files: Vec<PathBuf> = WalkDir::new(input_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported_image_format(e.path()))
            .map(|e| e.into_path())
            .collect();
        image_files.sort();
        image_files
    }

    /// Inputs sharing a stem in one directory (`cat.png`, `cat.jpg`) would
    /// write the same output file.
    fn check_output_collisions(&self, image_files: &[PathBuf]) -> Result<()> {
        let mut outputs: HashMap<PathBuf, &Path> = HashMap::with_capacity(image_files.len());
        for input_file in image_files {
            let output_file = self.output_file(&self.get_relative_path(input_file)?, 0, "");
            if let Some(previous) = outputs.insert(output_file.clone(), input_file.as_path()) {
                return Err(InpaintPrepError::Validation {
                    field: "input_dir".to_string(),
                    reason: format!(
                        "{} and {} would both be written to {}",
                        previous.display(),
                        input_file.display(),
                        output_file.display()
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn is_supported_image_format(&self, path: &Path) -> bool {
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            matches!(
                extension.to_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "tiff" | "avif"
            )
        } else {
            false
        }
    }

    pub fn process_single_image(&self, input_file: &Path) -> Result<()> {
        let relative_path = self.get_relative_path(input_file)?;
        let mask_file = self.find_mask(&relative_path)?;

        let image = open_image(input_file)?;
        let mask = open_image(&mask_file)?;

        let request = InpaintRequest::new(
            ImageInput::from_dynamic(&image),
            MaskInput::from_dynamic(&mask),
        )
        .with_params(self.config.inference_params())
        .with_num_images_per_prompt(self.config.num_images_per_prompt)
        .with_output_type(OutputType::Pil);

        let output = self
            .pipeline
            .call(request)
            .map_err(|e| InpaintPrepError::ImageProcessing {
                path: input_file.display().to_string(),
                operation: "inpainting".to_string(),
                source: Box::new(e),
            })?;

        let images = match output.images {
            Images::Pil(images) => images,
            Images::Np(_) => {
                return Err(InpaintPrepError::Validation {
                    field: "output_type".to_string(),
                    reason: "directory processing writes bitmaps".to_string(),
                })
            }
        };
        for (index, image) in images.iter().enumerate() {
            self.save(image, &self.output_file(&relative_path, index, ""))?;
        }

        if self.config.save_masks {
            // every replica shares the mask of its source image
            let masks = mask_to_gray_images(output.mask.view())?;
            if let Some(mask) = masks.first() {
                self.save(mask, &self.output_file(&relative_path, 0, "_mask"))?;
            }
        }

        Ok(())
    }

    /// Mask with the same relative path, or the same stem with `.png`.
    fn find_mask(&self, relative_path: &Path) -> Result<PathBuf> {
        let exact = self.config.mask_dir.join(relative_path);
        if exact.is_file() {
            return Ok(exact);
        }
        let png = exact.with_extension("png");
        if png.is_file() {
            return Ok(png);
        }
        Err(InpaintPrepError::FileSystem {
            path: exact,
            operation: "mask lookup".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no mask for image"),
        })
    }

    fn output_file(&self, relative_path: &Path, index: usize, suffix: &str) -> PathBuf {
        let stem = relative_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = if self.config.num_images_per_prompt > 1 && suffix.is_empty() {
            format!("{stem}_{index}.{}", self.config.format)
        } else {
            format!("{stem}{suffix}.{}", self.config.format)
        };
        let parent = relative_path.parent().unwrap_or_else(|| Path::new(""));
        self.config.output_dir.join(parent).join(name)
    }

    fn save<P, C>(&self, image: &image::ImageBuffer<P, C>, output_file: &Path) -> Result<()>
    where
        P: image::PixelWithColorType,
        [P::Subpixel]: image::EncodableLayout,
        C: std::ops::Deref<Target = [P::Subpixel]>,
    {
        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|e| InpaintPrepError::FileSystem {
                path: parent.to_path_buf(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }

        let format = ImageFormat::from_extension(&self.config.format).unwrap_or(ImageFormat::Png);
        image
            .save_with_format(output_file, format)
            .map_err(|e| InpaintPrepError::ImageProcessing {
                path: output_file.display().to_string(),
                operation: "image save".to_string(),
                source: Box::new(e),
            })
    }

    pub fn get_relative_path(&self, input_file: &Path) -> Result<PathBuf> {
        let input_dir = &self.config.input_dir;
        input_file
            .strip_prefix(input_dir)
            .map(|p| p.to_path_buf())
            .map_err(|_| InpaintPrepError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path resolution".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "input file is outside the input directory",
                ),
            })
    }
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).map_err(|e| InpaintPrepError::ImageProcessing {
        path: path.display().to_string(),
        operation: "image load".to_string(),
        source: Box::new(e),
    })
}
