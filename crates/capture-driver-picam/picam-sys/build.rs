use std::env;
use std::path::PathBuf;

fn main() {
    // Only run bindgen and linking logic if the `picam-sdk` feature is enabled.
    // Without it the crate compiles against an empty bindings file.
    #[cfg(feature = "picam-sdk")]
    {
        println!("cargo:rerun-if-env-changed=PICAM_SDK_DIR");
        println!("cargo:rerun-if-env-changed=PICAM_LIB_DIR");
        println!("cargo:rerun-if-changed=wrapper.h");

        let sdk_dir = env::var("PICAM_SDK_DIR").expect(
            "PICAM_SDK_DIR environment variable must be set when `picam-sdk` feature is enabled.",
        );

        // The SDK ships its headers under `includes/` on every platform.
        let sdk_include_path = PathBuf::from(&sdk_dir).join("includes");

        let sdk_lib_path = if let Ok(lib_dir) = env::var("PICAM_LIB_DIR") {
            PathBuf::from(lib_dir)
        } else if cfg!(target_os = "windows") {
            PathBuf::from(&sdk_dir).join("Libraries").join("x64")
        } else {
            PathBuf::from(&sdk_dir).join("runtime")
        };

        if !sdk_include_path.exists() {
            panic!(
                "PICam SDK include path does not exist: {:?}",
                sdk_include_path
            );
        }
        // Libraries may be installed system-wide; warn rather than panic.
        if !sdk_lib_path.exists() {
            eprintln!(
                "Warning: PICam SDK lib path does not exist: {:?}",
                sdk_lib_path
            );
        }

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            // Every entry point is `Picam_*`; the types they use are pulled in.
            .allowlist_function("Picam_.*")
            .allowlist_type("Picam.*")
            .allowlist_type("pi.*")
            // C enumerators already carry their type name (`PicamParameter_ExposureTime`),
            // so emit them as plain constants without a second prefix.
            .default_enum_style(bindgen::EnumVariation::Consts)
            .prepend_enum_name(false)
            .generate()
            .expect("Unable to generate bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());

        #[cfg(target_os = "windows")]
        {
            println!("cargo:rustc-link-lib=Picam");
        }
        #[cfg(not(target_os = "windows"))]
        {
            println!("cargo:rustc-link-lib=picam"); // libpicam.so
        }
    }
    #[cfg(not(feature = "picam-sdk"))]
    {
        let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings when picam-sdk feature is not enabled\npub mod picam_bindings {}\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
