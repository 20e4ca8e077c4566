use clap::Parser;
use image::ImageFormat;
use std::path::PathBuf;

use crate::pipeline::InpaintParams;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    pub input_dir: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// Directory holding one mask per input image, same relative paths.
    #[arg(short = 'k', long)]
    pub mask_dir: PathBuf,

    /// ONNX inpainting model. Without it the masked images are written as is.
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(short, long, default_value = "")]
    pub prompt: String,

    #[arg(long)]
    pub negative_prompt: Option<String>,

    #[arg(long, default_value_t = 50)]
    pub steps: usize,

    #[arg(long, default_value_t = 7.5)]
    pub guidance_scale: f32,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = 1)]
    pub num_images_per_prompt: usize,

    /// Also write the binarized mask next to each output.
    #[arg(long)]
    pub save_masks: bool,

    #[arg(short, long, default_value_t = default_num_threads())]
    pub num_threads: usize,
}

impl Config {
    pub fn inference_params(&self) -> InpaintParams {
        InpaintParams {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            seed: self.seed,
            num_inference_steps: self.steps,
            guidance_scale: self.guidance_scale,
        }
    }
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn check_format(s: &str) -> Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["inpaint-prep", "images", "-k", "masks"]).unwrap();
        assert_eq!(config.input_dir, PathBuf::from("images"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.mask_dir, PathBuf::from("masks"));
        assert_eq!(config.format, "png");
        assert!(config.model_path.is_none());
        assert_eq!(config.num_images_per_prompt, 1);

        let params = config.inference_params();
        assert_eq!(params, InpaintParams::default());
    }

    #[test]
    fn test_generation_flags() {
        let config = Config::try_parse_from([
            "inpaint-prep",
            "images",
            "out",
            "--mask-dir",
            "masks",
            "--prompt",
            "a cat",
            "--steps",
            "20",
            "--guidance-scale",
            "3.5",
            "--seed",
            "7",
        ])
        .unwrap();

        let params = config.inference_params();
        assert_eq!(params.prompt, "a cat");
        assert_eq!(params.num_inference_steps, 20);
        assert_eq!(params.guidance_scale, 3.5);
        assert_eq!(params.seed, Some(7));
    }

    #[test]
    fn test_unsupported_format() {
        let result =
            Config::try_parse_from(["inpaint-prep", "images", "-k", "masks", "-f", "txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mask_dir_is_required() {
        assert!(Config::try_parse_from(["inpaint-prep", "images"]).is_err());
    }
}
