/// Single source of truth for all commands
/// This macro takes a wrapper macro path and applies it to the command list
#[macro_export]
macro_rules! with_commands {
    ($($wrapper:tt)*) => {
        $($wrapper)*![
            // Model download
            $crate::commands::start_model_download,
            $crate::commands::cancel_model_download,
            $crate::commands::retry_model_download,
            $crate::commands::pause_model_download,
            $crate::commands::resume_model_download,
            $crate::commands::get_model_download_state,
            // Speech
            $crate::commands::generate_speech,
            // Configuration
            $crate::commands::load_model_config,
            $crate::commands::save_model_config,
        ]
    };
}
