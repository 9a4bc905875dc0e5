// src/server/tick.rs
//! The tick pipeline
//!
//! Runs the stages of one tick strictly in order, threading each stage's
//! result into the next. The terminal cleanup stage always runs; a stage
//! failure is re-raised afterwards. When the watchdog fires mid-run the
//! queues are reset immediately and the run is poisoned: the stalled
//! stage's late result is discarded and the tick fails with a stall error.

use crate::pipeline::{Stage, StageData, TickOptions, TickRun};
use crate::server::server::SimServer;
use crate::store::pubsub::channels;
use crate::utils::errors::{Result, ServerError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

impl SimServer {
    /// Advance the simulation by one step.
    ///
    /// `options.stages` overrides the canonical stage sequence for testing
    /// and extension.
    pub async fn tick(&self, options: TickOptions) -> Result<()> {
        if !self.connected() {
            return Err(ServerError::NotConnected);
        }
        let stages = options
            .stages
            .unwrap_or_else(|| Stage::CANONICAL.to_vec());

        let mut run = TickRun::new(
            self.config().watchdog_timeout(),
            Arc::clone(self.queues()),
        );
        let mut data = StageData::Empty;

        for stage in stages {
            run.set_stage(stage);
            self.storage()
                .pubsub
                .publish(channels::TICK_STAGE, stage.name());
            debug!(stage = stage.name(), "running tick stage");

            let result = self.run_stage(&mut run, stage, data).await;
            let stalled = run.stalled() && stage != Stage::Finish;
            match result {
                Err(err) => {
                    let _ = self
                        .run_stage(&mut run, Stage::Finish, StageData::Empty)
                        .await;
                    return Err(err);
                }
                Ok(_) if stalled => {
                    // The watchdog already reset the queues; drop the late
                    // result instead of applying it.
                    let _ = self
                        .run_stage(&mut run, Stage::Finish, StageData::Empty)
                        .await;
                    return Err(ServerError::TickStalled { stage });
                }
                Ok(next) => data = next,
            }
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        run: &mut TickRun,
        stage: Stage,
        data: StageData,
    ) -> Result<StageData> {
        match stage {
            Stage::Start => self.start_stage(run).await,
            Stage::GetUsers => self.get_users_stage().await,
            Stage::AddUsersToQueue => self.add_users_to_queue_stage(data).await,
            Stage::WaitForUsers => self.wait_for_users_stage().await,
            Stage::GetRooms => self.get_rooms_stage().await,
            Stage::AddRoomsToQueue => self.add_rooms_to_queue_stage(data).await,
            Stage::WaitForRooms => self.wait_for_rooms_stage().await,
            Stage::Commit1 | Stage::Commit2 => self.commit_stage().await,
            Stage::Global => self.global_stage().await,
            Stage::IncrementGameTime => self.increment_game_time_stage().await,
            Stage::NotifyRoomsDone => self.notify_rooms_done_stage(data).await,
            Stage::Custom => self.custom_stage().await,
            Stage::Finish => self.finish_stage(run).await,
        }
    }

    async fn start_stage(&self, run: &mut TickRun) -> Result<StageData> {
        run.rearm_watchdog();
        self.driver().notify_tick_started().await?;
        Ok(StageData::Empty)
    }

    async fn get_users_stage(&self) -> Result<StageData> {
        Ok(StageData::Users(self.driver().get_all_users().await?))
    }

    async fn add_users_to_queue_stage(&self, data: StageData) -> Result<StageData> {
        self.users_queue()?.add_multi(data.into_ids()).await?;
        Ok(StageData::Empty)
    }

    async fn wait_for_users_stage(&self) -> Result<StageData> {
        self.users_queue()?.when_all_done().await?;
        Ok(StageData::Empty)
    }

    async fn get_rooms_stage(&self) -> Result<StageData> {
        Ok(StageData::Rooms(self.driver().get_all_rooms().await?))
    }

    async fn add_rooms_to_queue_stage(&self, data: StageData) -> Result<StageData> {
        self.rooms_queue()?.add_multi(data.into_ids()).await?;
        Ok(StageData::Empty)
    }

    async fn wait_for_rooms_stage(&self) -> Result<StageData> {
        self.rooms_queue()?.when_all_done().await?;
        Ok(StageData::Empty)
    }

    async fn commit_stage(&self) -> Result<StageData> {
        self.driver().commit_bulk().await?;
        Ok(StageData::Empty)
    }

    async fn global_stage(&self) -> Result<StageData> {
        if let Some(hook) = &self.global_hook {
            hook().await?;
        }
        Ok(StageData::Empty)
    }

    async fn increment_game_time_stage(&self) -> Result<StageData> {
        let game_time = self.driver().increment_game_time().await?;
        let interval = self.config().tick.rooms_refresh_interval as i64;
        let last = self.last_rooms_refresh.load(Ordering::Relaxed);
        if game_time as i64 > last + interval {
            self.last_rooms_refresh
                .store(game_time as i64, Ordering::Relaxed);
            self.driver().update_accessible_rooms_list().await?;
        }
        Ok(StageData::GameTime(game_time))
    }

    async fn notify_rooms_done_stage(&self, data: StageData) -> Result<StageData> {
        let game_time = match data {
            StageData::GameTime(game_time) => game_time,
            _ => self.driver().game_time().await?,
        };
        self.driver().notify_rooms_done(game_time).await?;
        Ok(StageData::GameTime(game_time))
    }

    async fn custom_stage(&self) -> Result<StageData> {
        if let Some(hook) = &self.custom_hook {
            hook().await?;
        }
        Ok(StageData::Empty)
    }

    async fn finish_stage(&self, run: &mut TickRun) -> Result<StageData> {
        run.finish();
        Ok(StageData::Empty)
    }
}
