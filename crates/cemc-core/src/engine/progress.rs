#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement { amount: u64 },
    TaskFinish,

    StatusUpdate { text: String },
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn callback_receives_every_event() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
            seen.lock().unwrap().push(format!("{event:?}"));
        }));
        reporter.report(Progress::PhaseStart { name: "Sampling" });
        reporter.report(Progress::TaskIncrement { amount: 2 });
        reporter.report(Progress::PhaseFinish);
        drop(reporter);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains("Sampling"));
    }

    #[test]
    fn reporter_without_callback_is_silent() {
        ProgressReporter::new().report(Progress::Message("ignored".to_string()));
    }
}
