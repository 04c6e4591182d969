//! Platform key detection.
//!
//! Platform keys follow the `os/arch` convention used in asset declarations,
//! e.g. `linux/amd64`, `darwin/arm64`, `windows/amd64`.

/// Detect the platform key for the current build target.
pub fn detect() -> String {
    let os = if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    };

    let arch = if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        std::env::consts::ARCH
    };

    format!("{os}/{arch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_shape() {
        let key = detect();
        let (os, arch) = key.split_once('/').expect("platform key has one slash");
        assert!(!os.is_empty());
        assert!(!arch.is_empty());
    }
}
