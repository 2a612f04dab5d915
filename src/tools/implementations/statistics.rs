//! `get_statistics`: aggregate counts

use crate::errors::Result;
use crate::store::StatisticsQuery;
use crate::tools::types::{date_arg, GetStatisticsArgs, ToolContext, ToolName, ToolOutput};

pub async fn get_statistics(ctx: &ToolContext, args: GetStatisticsArgs) -> Result<ToolOutput> {
    let tool = ToolName::GetStatistics;

    let query = StatisticsQuery {
        record_kind: args.record_kind.unwrap_or_default(),
        group_by: args.group_by.filter(|g| !g.trim().is_empty()),
        date_from: date_arg(tool, "date_from", args.date_from.as_deref())?,
        date_to: date_arg(tool, "date_to", args.date_to.as_deref())?,
    };

    let stats = ctx.store.statistics(&query).await?;
    Ok(ToolOutput::Statistics { query, stats })
}
