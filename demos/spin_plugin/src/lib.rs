//! A move strategy built as a stand-alone plug-in module.

use std::sync::{Arc, Mutex};

use vrkit::plugins::Info;
use vrkit::strategy::{MoveStrategyCategory, Strategy, StrategyPtr};

struct Spin {
    info: Info,
    turns: u32,
}

impl Strategy for Spin {
    fn info(&self) -> &Info {
        &self.info
    }

    fn description(&self) -> String {
        format!("{} ({} turns)", self.info.name(), self.turns)
    }

    fn init(&mut self) -> vrkit::Result<()> {
        self.turns = 1;
        Ok(())
    }
}

fn spin_info() -> Info {
    Info::simple("demo", "Spin", vec![1, 0]).expect("valid plug-in identity")
}

fn spin() -> StrategyPtr {
    Arc::new(Mutex::new(Spin {
        info: spin_info(),
        turns: 0,
    }))
}

vrkit::export_plugin! {
    category: MoveStrategyCategory,
    version_fn: getPluginInterfaceVersion,
    creator_fn: getMoveStrategyCreator,
    info: spin_info(),
    creator: spin,
}
