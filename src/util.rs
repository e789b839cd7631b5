use poise::{
    serenity_prelude::{ChannelId, CreateEmbed, Http},
    CreateReply,
};
use serenity::all::CreateMessage;

use crate::PoiseContext;

pub fn get_styled_embed(text: &str) -> CreateEmbed {
    CreateEmbed::new().colour(0xf542bf).description(text)
}

pub async fn send_embed(http: &Http, channel_id: ChannelId, text: &str) -> anyhow::Result<()> {
    channel_id
        .send_message(http, CreateMessage::new().add_embed(get_styled_embed(text)))
        .await?;
    Ok(())
}

pub async fn reply_embed(ctx: &PoiseContext<'_>, text: &str) -> anyhow::Result<()> {
    ctx.send(CreateReply::default().embed(get_styled_embed(text)))
        .await?;
    Ok(())
}
