#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is free text.
pub(crate) const TEXT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "prompt",
        action: "set_prompt",
    },
    CommandSpec {
        command: "refine",
        action: "refine",
    },
    CommandSpec {
        command: "ratio",
        action: "set_aspect_ratio",
    },
    CommandSpec {
        command: "lighting",
        action: "set_lighting_style",
    },
    CommandSpec {
        command: "camera",
        action: "set_camera_perspective",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "product",
        action: "set_product_image",
    },
    CommandSpec {
        command: "style",
        action: "set_style_image",
    },
];

pub(crate) const INDEX_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "open",
        action: "viewer_open",
    },
    CommandSpec {
        command: "delete",
        action: "history_delete",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "next",
        action: "viewer_next",
    },
    CommandSpec {
        command: "prev",
        action: "viewer_previous",
    },
    CommandSpec {
        command: "close",
        action: "viewer_close",
    },
    CommandSpec {
        command: "options",
        action: "options",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/product <path>",
    "/style [path]",
    "/ratio <tag>",
    "/lighting <tag>",
    "/camera <tag>",
    "/prompt <text>",
    "/generate",
    "/refine <text>",
    "/history",
    "/open <i>",
    "/next",
    "/prev",
    "/close",
    "/delete <i>",
    "/download [i]",
    "/options",
    "/status",
    "/help",
    "/quit",
];
