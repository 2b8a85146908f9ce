use iocraft::prelude::*;
use tokio::sync::watch;

use crate::session::UploadProgress;

const BAR_WIDTH: usize = 40;

fn percent(progress: &UploadProgress) -> f32 {
    if progress.total_bytes == 0 {
        return 100.0;
    }
    (progress.bytes_uploaded as f32 / progress.total_bytes as f32) * 100.0
}

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    pub progress: Option<watch::Receiver<UploadProgress>>,
}

#[component]
pub fn ProgressBar(props: &ProgressBarProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut current = hooks.use_state(|| 0.0f32);
    let progress = props.progress.clone();

    hooks.use_future(async move {
        if let Some(mut progress) = progress {
            loop {
                current.set(percent(&progress.borrow_and_update()));
                if progress.changed().await.is_err() {
                    break;
                }
            }
        }
    });

    let value = current.get().clamp(0.0, 100.0);
    let filled = ((value / 100.0) * BAR_WIDTH as f32).round() as usize;

    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(weight: Weight::Bold, content: format!("{} ", props.title))
            Text(color: Color::Cyan, content: "█".repeat(filled))
            Text(content: "░".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)))
            Text(content: format!(" {:>5.1}%", value))
        }
    }
}

#[derive(Default, Props)]
pub struct MessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Red, weight: Weight::Bold, content: "✗ ")
            Text(color: Color::Red, content: &props.message)
        }
    }
}

#[component]
pub fn WarningMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Yellow, weight: Weight::Bold, content: "! ")
            Text(color: Color::Yellow, content: &props.message)
        }
    }
}

#[component]
pub fn SuccessMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Green, weight: Weight::Bold, content: "✓ ")
            Text(content: &props.message)
        }
    }
}

#[component]
pub fn ConfigHeader() -> impl Into<AnyElement<'static>> {
    element! {
        View(
            flex_direction: FlexDirection::Column,
            border_style: BorderStyle::Round,
            border_color: Color::Blue
        ) {
            Text(weight: Weight::Bold, content: "mpup configuration")
            Text(content: "Values are saved to the mpup config file; the API key goes to the OS keyring.")
        }
    }
}

#[derive(Default, Props)]
pub struct InputPromptProps {
    pub prompt: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

#[component]
pub fn InputPrompt(props: &InputPromptProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(weight: Weight::Bold, content: &props.prompt)
                #(props.default.as_ref().map(|default| element! {
                    Text(color: Color::DarkGrey, content: format!(" [{}]", default))
                }))
            }
            #(props.description.as_ref().map(|description| element! {
                Text(color: Color::DarkGrey, content: description.clone())
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let half = UploadProgress {
            bytes_uploaded: 5,
            total_bytes: 10,
        };
        assert_eq!(percent(&half), 50.0);

        let empty = UploadProgress::default();
        assert_eq!(percent(&empty), 100.0);
    }
}
