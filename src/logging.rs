use cfg_if::cfg_if;
use std::any::Any;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human readable panic text from a location and payload
pub fn describe_panic(location: Option<(&str, u32, u32)>, payload: &(dyn Any + Send)) -> String {
    let mut msg = String::new();
    if let Some((file, line, column)) = location {
        msg.push_str(&format!("panic at {file}:{line}:{column} "));
    }
    if let Some(s) = payload.downcast_ref::<&str>() {
        msg.push_str(s);
    } else if let Some(s) = payload.downcast_ref::<String>() {
        msg.push_str(s);
    } else {
        msg.push_str("<non-string panic>");
    }
    msg
}

cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        use wasm_bindgen::closure::Closure;
        use wasm_bindgen::JsCast;

        pub fn init() {
            // Log to browser console via tracing-wasm
            let wasm_layer = tracing_wasm::WASMLayer::new(tracing_wasm::WASMLayerConfig::default());

            // a second init (e.g. hot reload) keeps the first subscriber
            let _ = tracing_subscriber::registry()
                .with(default_filter())
                .with(wasm_layer)
                .try_init();

            #[cfg(feature = "console_error_panic_hook")]
            console_error_panic_hook::set_once();
        }

        /// Log uncaught script errors with their source location and keep running
        pub fn install_global_error_listener(window: &web_sys::Window) -> Result<(), wasm_bindgen::JsValue> {
            let on_error = Closure::wrap(Box::new(move |e: web_sys::ErrorEvent| {
                tracing::error!(
                    "uncaught error: {} ({}:{}:{})",
                    e.message(),
                    e.filename(),
                    e.lineno(),
                    e.colno()
                );
            }) as Box<dyn FnMut(web_sys::ErrorEvent)>);
            window.add_event_listener_with_callback("error", on_error.as_ref().unchecked_ref())?;
            on_error.forget();
            Ok(())
        }
    } else {
        use once_cell::sync::OnceCell;
        use std::path::{Path, PathBuf};
        use tracing_appender::non_blocking::WorkerGuard;
        use tracing_subscriber::fmt;

        static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

        /// Directory and file name of the rolling log, from `RUST_LOG_FILE`
        pub fn log_file_location(value: Option<&str>) -> (PathBuf, PathBuf) {
            let path = Path::new(value.unwrap_or("logs/app.log"));
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file = path.file_name().map(Path::new).unwrap_or(Path::new("app.log"));
            (dir.to_path_buf(), file.to_path_buf())
        }

        pub fn init() {
            let console_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact();

            let env_path = std::env::var("RUST_LOG_FILE").ok();
            let (dir, file) = log_file_location(env_path.as_deref());
            let (nb_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file));
            let _ = FILE_GUARD.set(guard);

            let file_layer = fmt::layer()
                .with_writer(nb_writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact();

            let _ = tracing_subscriber::registry()
                .with(default_filter())
                .with(console_layer)
                .with(file_layer)
                .try_init();

            // Hook panics to log with backtrace
            std::panic::set_hook(Box::new(|info| {
                let location = info.location().map(|l| (l.file(), l.line(), l.column()));
                let msg = describe_panic(location, info.payload());
                let bt = std::backtrace::Backtrace::force_capture();
                tracing::error!("{}\nBacktrace:\n{:?}", msg, bt);
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_panic() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(describe_panic(Some(("src/lib.rs", 3, 9)), payload.as_ref()), "panic at src/lib.rs:3:9 boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(describe_panic(None, payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(describe_panic(None, payload.as_ref()), "<non-string panic>");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_log_file_location() {
        use std::path::PathBuf;
        assert_eq!(log_file_location(None), (PathBuf::from("logs"), PathBuf::from("app.log")));
        assert_eq!(log_file_location(Some("viewer.log")), (PathBuf::from("."), PathBuf::from("viewer.log")));
        assert_eq!(
            log_file_location(Some("/tmp/x/lung.log")),
            (PathBuf::from("/tmp/x"), PathBuf::from("lung.log"))
        );
    }
}
