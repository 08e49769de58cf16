//! Stage descriptors used by the pipelines
//!
//! Every command ends with `{output}` as its last argument.

use darkroom_core::domain::intent::ModelVariant;

use crate::registry::models;
use crate::stage::StageDescriptor;

/// Foreground cut-out with an alpha channel
pub const SEGMENT: StageDescriptor = StageDescriptor {
    name: "segment",
    unit: models::SEGMENT,
    inputs: &["input"],
    command: &["rembg", "i", "-m", "{model}", "{input}", "{output}"],
    cleanup: None,
    output_ext: "png",
};

/// Mask of the object under a point
pub const POINT_SEGMENT: StageDescriptor = StageDescriptor {
    name: "point-segment",
    unit: models::POINT_SEGMENT,
    inputs: &["input"],
    command: &[
        "python",
        "/app/sam_point.py",
        "--input",
        "{input}",
        "--x",
        "{x}",
        "--y",
        "{y}",
        "--output",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

/// Grows a mask so inpainting covers object edges
pub const DILATE: StageDescriptor = StageDescriptor {
    name: "dilate",
    unit: models::IMAGE_TOOLS,
    inputs: &["input"],
    command: &[
        "magick",
        "{input}",
        "-morphology",
        "Dilate",
        "Disk:{radius}",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

/// Fills the masked region of an image
pub const INPAINT: StageDescriptor = StageDescriptor {
    name: "inpaint",
    unit: models::INPAINT,
    inputs: &["image", "mask"],
    command: &[
        "python",
        "/app/inpaint.py",
        "--image",
        "{image}",
        "--mask",
        "{mask}",
        "--output",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

/// Places the subject over the background
pub const COMPOSITE: StageDescriptor = StageDescriptor {
    name: "composite",
    unit: models::IMAGE_TOOLS,
    inputs: &["background", "subject"],
    command: &[
        "magick",
        "{background}",
        "{subject}",
        "-gravity",
        "center",
        "-composite",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

/// Turns a cut-out's alpha channel into a black and white mask
pub const BINARIZE: StageDescriptor = StageDescriptor {
    name: "binarize",
    unit: models::IMAGE_TOOLS,
    inputs: &["input"],
    command: &[
        "magick",
        "{input}",
        "-alpha",
        "extract",
        "-threshold",
        "50%",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

pub const HARMONIZE: StageDescriptor = StageDescriptor {
    name: "harmonize",
    unit: models::HARMONIZE,
    inputs: &["composite", "mask"],
    command: &[
        "python",
        "/app/harmonize.py",
        "--composite",
        "{composite}",
        "--mask",
        "{mask}",
        "--output",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

pub const RELIGHT: StageDescriptor = StageDescriptor {
    name: "relight",
    unit: models::RELIGHT,
    inputs: &["input"],
    command: &[
        "python",
        "/app/relight.py",
        "--input",
        "{input}",
        "--brightness",
        "{brightness}",
        "--direction",
        "{direction}",
        "--output",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

/// Denoise or deblur
pub const RESTORE: StageDescriptor = StageDescriptor {
    name: "restore",
    unit: models::RESTORE,
    inputs: &["input"],
    command: &[
        "python",
        "/app/nafnet.py",
        "--task",
        "{mode}",
        "--input",
        "{input}",
        "--output",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

pub const FACE_RESTORE: StageDescriptor = StageDescriptor {
    name: "face-restore",
    unit: models::FACE_RESTORE,
    inputs: &["input"],
    command: &[
        "python",
        "/app/codeformer.py",
        "--fidelity",
        "{fidelity}",
        "--input",
        "{input}",
        "--output",
        "{output}",
    ],
    // CodeFormer keeps intermediate crops next to its results
    cleanup: Some(&["rm", "-rf", "/tmp/codeformer-results"]),
    output_ext: "png",
};

pub const STYLE_TRANSFER: StageDescriptor = StageDescriptor {
    name: "style-transfer",
    unit: models::STYLE,
    inputs: &["input"],
    command: &[
        "python",
        "/app/stylize.py",
        "--style",
        "{style}",
        "--input",
        "{input}",
        "--output",
        "{output}",
    ],
    cleanup: None,
    output_ext: "png",
};

/// Segmentation model for a variant
pub fn segment_model(variant: ModelVariant) -> &'static str {
    match variant {
        ModelVariant::Human => "u2net_human_seg",
        ModelVariant::General => "isnet-general-use",
    }
}
